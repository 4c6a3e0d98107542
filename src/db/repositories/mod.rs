mod blobs;

pub use blobs::BlobRecord;
