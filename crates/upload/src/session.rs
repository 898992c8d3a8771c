//! Single-use upload session.
//!
//! A session is a typestate value: `Credentialed -> Applied -> Transferred`.
//! Each step consumes the previous state and the type is not `Clone`, so a
//! set of credentials can drive exactly one apply/transfer/commit sequence.
//! Retrying means fetching a fresh session.

use crate::media::MediaKind;
use crate::signer::Credentials;

/// Output of the token stage. Moved into exactly one session.
#[derive(Debug, PartialEq, Eq)]
pub struct UploadCredentials {
    pub credentials: Credentials,
    /// `ServiceId` (images) or `SpaceName` (video/audio)
    pub service_id: String,
    /// Host serving apply/commit calls
    pub upload_domain: String,
}

/// Upload node chosen from the apply response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadNode {
    pub upload_host: String,
    pub store_uri: String,
    /// Per-node authorization for the transfer call
    pub auth: String,
    pub session_key: String,
    /// Provider-assigned id, known up front for video/audio
    pub content_id: Option<String>,
}

#[derive(Debug)]
pub struct Credentialed;

#[derive(Debug)]
pub struct Applied {
    pub(crate) node: UploadNode,
}

#[derive(Debug)]
pub struct Transferred {
    pub(crate) node: UploadNode,
    pub(crate) crc32: String,
}

#[derive(Debug)]
pub struct UploadSession<S> {
    kind: MediaKind,
    credentials: UploadCredentials,
    state: S,
}

impl<S> UploadSession<S> {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn credentials(&self) -> &UploadCredentials {
        &self.credentials
    }
}

impl UploadSession<Credentialed> {
    pub(crate) fn new(kind: MediaKind, credentials: UploadCredentials) -> Self {
        Self {
            kind,
            credentials,
            state: Credentialed,
        }
    }

    pub(crate) fn applied(self, node: UploadNode) -> UploadSession<Applied> {
        UploadSession {
            kind: self.kind,
            credentials: self.credentials,
            state: Applied { node },
        }
    }
}

impl UploadSession<Applied> {
    pub fn node(&self) -> &UploadNode {
        &self.state.node
    }

    pub(crate) fn transferred(self, crc32: String) -> UploadSession<Transferred> {
        UploadSession {
            kind: self.kind,
            credentials: self.credentials,
            state: Transferred {
                node: self.state.node,
                crc32,
            },
        }
    }
}

impl UploadSession<Transferred> {
    pub fn node(&self) -> &UploadNode {
        &self.state.node
    }

    /// Checksum confirmed by the provider.
    pub fn crc32(&self) -> &str {
        &self.state.crc32
    }
}
