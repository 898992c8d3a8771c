//! Media kinds, per-kind routing and finished-asset metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Shortest audio clip the provider accepts, in seconds.
pub const AUDIO_MIN_SECONDS: f64 = 2.0;
/// Longest audio clip the provider accepts, in seconds.
pub const AUDIO_MAX_SECONDS: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// `scene` value sent when exchanging the refresh token.
    pub fn token_scene(&self) -> u8 {
        match self {
            MediaKind::Image => 2,
            MediaKind::Video | MediaKind::Audio => 1,
        }
    }

    pub fn route(&self) -> &'static Route {
        match self {
            MediaKind::Image => &IMAGE_ROUTE,
            // No dedicated audio path: audio rides the video service.
            MediaKind::Video | MediaKind::Audio => &VIDEO_ROUTE,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider service a media kind is uploaded through.
#[derive(Debug, PartialEq, Eq)]
pub struct Route {
    pub apply_action: &'static str,
    pub commit_action: &'static str,
    pub version: &'static str,
    /// Query parameter carrying the service/space identifier
    pub id_param: &'static str,
    /// Extra apply parameters (type overrides)
    pub apply_extra: &'static [(&'static str, &'static str)],
    pub signing_service: &'static str,
}

pub static IMAGE_ROUTE: Route = Route {
    apply_action: "ApplyImageUpload",
    commit_action: "CommitImageUpload",
    version: "2018-08-01",
    id_param: "ServiceId",
    apply_extra: &[],
    signing_service: "imagex",
};

pub static VIDEO_ROUTE: Route = Route {
    apply_action: "ApplyUploadInner",
    commit_action: "CommitUploadInner",
    version: "2020-11-19",
    id_param: "SpaceName",
    apply_extra: &[("FileType", "video"), ("IsInner", "1")],
    signing_service: "vod",
};

/// Metadata the provider reports for a committed asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetMetadata {
    Image {
        width: u32,
        height: u32,
        format: String,
    },
    Video {
        duration: f64,
        width: u32,
        height: u32,
        format: String,
        size: u64,
        md5: String,
    },
    Audio {
        duration: f64,
        duration_ms: u64,
        format: String,
        size: u64,
        md5: String,
    },
}

/// A committed upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedAsset {
    /// Provider content id (`vid` for video/audio, image URI for images)
    pub content_id: String,
    pub store_uri: String,
    pub kind: MediaKind,
    pub metadata: AssetMetadata,
}

/// Reject audio clips the provider will not accept downstream.
pub fn validate_audio_duration(seconds: f64) -> Result<(), UploadError> {
    if !(AUDIO_MIN_SECONDS..=AUDIO_MAX_SECONDS).contains(&seconds) {
        return Err(UploadError::AudioDuration {
            seconds,
            min: AUDIO_MIN_SECONDS,
            max: AUDIO_MAX_SECONDS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_is_routed_as_video() {
        assert_eq!(MediaKind::Audio.route(), &VIDEO_ROUTE);
        assert_eq!(MediaKind::Image.route().signing_service, "imagex");
        assert_eq!(MediaKind::Audio.token_scene(), 1);
        assert_eq!(MediaKind::Image.token_scene(), 2);
    }

    #[test]
    fn audio_duration_bounds_are_inclusive() {
        assert!(validate_audio_duration(2.0).is_ok());
        assert!(validate_audio_duration(15.0).is_ok());
        assert!(validate_audio_duration(7.3).is_ok());

        let err = validate_audio_duration(1.5).unwrap_err();
        assert!(matches!(err, UploadError::AudioDuration { seconds, .. } if seconds == 1.5));
        assert!(err.to_string().contains("1.5"));
        assert!(validate_audio_duration(15.01).is_err());
        assert!(validate_audio_duration(f64::NAN).is_err());
    }
}
