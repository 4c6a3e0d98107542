//! Step 6: colour, auto-name and age annotation, merged into one guarded
//! write per group.

use chrono::{DateTime, Duration, Utc};

use crate::models::{GroupColor, NamingProgress, SpecialStage, Zone};
use crate::naming::{generate_name, parse, AgeAnnotation, NamingConfig, NamingInput, ParsedTitle, TitleEdit};
use crate::provider::{Browser, GroupUpdate, LiveGroup};
use crate::settings::Settings;

/// How long auto-naming stays off for a group after the user retitles it.
pub const USER_EDIT_LOCK: Duration = Duration::seconds(30);

/// What the manager knows about one group this cycle.
#[derive(Debug, Clone)]
pub struct GroupFacts {
    pub zone: Zone,
    pub special: Option<SpecialStage>,
    /// Age of the freshest live member, if any member is tracked.
    pub age_ms: Option<u64>,
    pub members: Vec<NamingInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataWrite {
    pub expected_title: String,
    pub title: String,
    pub color: GroupColor,
    /// Auto-assigned base name, when this write names the group.
    pub named: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The title changed under us; nothing was written.
    Aborted,
    Vanished,
}

/// Naming gate. Records when the group was first seen unnamed as a side
/// effect, so the delay is measured from the first observation.
pub fn naming_eligible(
    progress: &mut NamingProgress,
    parsed: &ParsedTitle,
    special: bool,
    settings: &Settings,
    now: DateTime<Utc>,
) -> bool {
    if !parsed.is_unnamed() {
        progress.first_seen_unnamed_at = None;
        return false;
    }
    if !settings.naming.enabled || special {
        return false;
    }
    let first_seen = *progress.first_seen_unnamed_at.get_or_insert(now);
    let waited_ms = (now - first_seen).num_milliseconds().max(0) as u64;
    if waited_ms < settings.naming.delay_ms {
        return false;
    }
    !progress.is_locked(now)
}

pub fn plan_write(
    live: &LiveGroup,
    facts: &GroupFacts,
    progress: &mut NamingProgress,
    settings: &Settings,
    config: &NamingConfig,
    now: DateTime<Utc>,
) -> Option<MetadataWrite> {
    let parsed = parse(&live.title);
    let mut edit = TitleEdit::default();
    let mut named = None;

    if let Some(stage) = facts.special {
        if parsed.is_unnamed() {
            edit.base = Some(stage.default_title().to_string());
        }
    } else if naming_eligible(progress, &parsed, false, settings, now) {
        if let Some(candidate) = generate_name(&facts.members, config) {
            edit.base = Some(candidate.text.clone());
            named = Some(candidate.text);
        }
    }

    if settings.age_display {
        if let Some(age_ms) = facts.age_ms {
            edit.annotation = Some(Some(AgeAnnotation::from_age_ms(age_ms)));
        }
    } else if parsed.annotation.is_some()
        && progress.last_written_title.as_deref() == Some(live.title.as_str())
    {
        // Only an annotation this engine wrote is taken back.
        edit.annotation = Some(None);
    }

    let title = edit.apply(&live.title);
    let color = facts.zone.color();
    if title == live.title && color == live.color {
        return None;
    }
    Some(MetadataWrite {
        expected_title: live.title.clone(),
        title,
        color,
        named,
    })
}

/// Re-reads the group and writes only if its title is still what the plan
/// was built from.
pub async fn write<B: Browser + ?Sized>(
    browser: &B,
    group_id: i64,
    write: &MetadataWrite,
) -> anyhow::Result<WriteOutcome> {
    let Some(fresh) = browser.get_group(group_id).await? else {
        return Ok(WriteOutcome::Vanished);
    };
    if fresh.title != write.expected_title {
        return Ok(WriteOutcome::Aborted);
    }

    let update = GroupUpdate {
        title: (write.title != fresh.title).then(|| write.title.clone()),
        color: (write.color != fresh.color).then_some(write.color),
    };
    browser.update_group(group_id, update).await?;
    Ok(WriteOutcome::Written)
}
