//! `genjobs-upload`: signed media upload.
//!
//! Stages media with the provider's four-step handshake:
//!
//! 1. **token**: refresh token in, short-lived credentials out ([`TokenSource`])
//! 2. **apply**: signed GET reserving an upload node
//! 3. **transfer**: raw bytes with a `Content-CRC32` checksum
//! 4. **commit**: signed POST returning the content id and asset metadata
//!
//! Apply and commit are signed with [`signer::sign`]. An [`UploadSession`]
//! carries one set of credentials through the stages and cannot be reused.

pub mod client;
pub mod error;
pub mod media;
pub mod session;
pub mod signer;
pub mod token;
mod wire;

pub use client::{UploadClient, content_crc32};
pub use error::{Stage, UploadError};
pub use media::{
    AUDIO_MAX_SECONDS, AUDIO_MIN_SECONDS, AssetMetadata, MediaKind, UploadedAsset,
    validate_audio_duration,
};
pub use session::{UploadCredentials, UploadNode, UploadSession};
pub use signer::{Credentials, SigningError};
pub use token::{HttpTokenSource, TokenSource, parse_token_response};
