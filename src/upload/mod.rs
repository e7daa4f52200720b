mod auth;
mod drive;
mod uploader;

pub use drive::DriveClient;
pub use uploader::{RemoteStorage, UploadOutcome, Uploader};

#[cfg(test)]
pub(crate) use uploader::tests::{Call, FakeStorage};
