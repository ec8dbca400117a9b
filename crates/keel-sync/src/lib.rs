//! # Keel Sync
//!
//! Full-replace upload of the service's source tree to the host.
//!
//! The tree is packed into a deterministic tarball whose digest names the
//! release. Each release is extracted into a staging directory and only
//! becomes live by an atomic rename of the `current` symlink, so the live
//! path never references a half-copied tree. The secret-bearing env file
//! is never packed; it is written separately with [`ArtifactSync::push_env`].

pub mod error;
pub mod layout;
pub mod pack;
pub mod sync;

pub use error::{TransferError, TransferResult};
pub use layout::RemoteLayout;
pub use pack::{pack, PackManifest, PackOptions};
pub use sync::{ArtifactSync, SyncConfig, SyncReceipt};
