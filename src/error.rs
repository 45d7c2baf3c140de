use thiserror::Error;

/// Failure of a single resolution attempt.
///
/// Every step of both strategies is terminal: a resolution yields either a
/// `ResolvedUrl` or exactly one of these.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("not an http(s) url: {url}")]
    InvalidUrl { url: String },

    #[error("no packed eval(function(p,a,c,k,e,d)...) call found in page")]
    ObfuscationNotFound,

    #[error("malformed packer arguments: {0}")]
    MalformedPackerArguments(String),

    #[error("no `source:` url in unpacked script ({} bytes)", decoded.len())]
    SourceFieldNotFound { decoded: String },

    #[error("unpacked script uses a `sources:[...]` list, which is not supported")]
    UnsupportedSourceFormat { decoded: String },

    #[error("no player iframe on {url}")]
    PlayerFrameNotFound { url: String },

    #[error("no download nonce on {url}")]
    NonceNotFound { url: String },

    #[error("no download links published yet for mal id {mal_id}, episode {episode}")]
    LinksNotPublished { mal_id: u64, episode: u32 },

    #[error("download endpoint returned unexpected status {status}")]
    UnexpectedEndpointStatus { status: String },

    #[error("download endpoint payload is malformed: {0}")]
    MalformedEndpointPayload(String),

    #[error("no \"{label}\" section in download links")]
    SectionNotFound { label: String },

    #[error("\"{label}\" section has no links container")]
    LinksContainerNotFound { label: String },

    #[error("quality {requested} not available (found: {})", available.join(", "))]
    QualityNotAvailable {
        requested: String,
        available: Vec<String>,
    },
}

impl ResolveError {
    pub fn transport(url: &str, source: reqwest::Error) -> Self {
        ResolveError::Transport {
            url: url.to_string(),
            source,
        }
    }

    /// Unpacked script text carried by source-extraction failures.
    pub fn decoded_script(&self) -> Option<&str> {
        match self {
            ResolveError::SourceFieldNotFound { decoded }
            | ResolveError::UnsupportedSourceFormat { decoded } => Some(decoded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_miss_lists_available_qualities() {
        let err = ResolveError::QualityNotAvailable {
            requested: "360p".to_string(),
            available: vec!["720p".to_string(), "1080p".to_string()],
        };
        assert_eq!(err.to_string(), "quality 360p not available (found: 720p, 1080p)");
    }

    #[test]
    fn decoded_script_only_on_source_failures() {
        let err = ResolveError::SourceFieldNotFound {
            decoded: "var a=1;".to_string(),
        };
        assert_eq!(err.decoded_script(), Some("var a=1;"));
        assert!(err.to_string().contains("8 bytes"));
        assert_eq!(ResolveError::ObfuscationNotFound.decoded_script(), None);
    }

    #[tokio::test]
    async fn transport_cause_is_only_in_the_chain() {
        let source = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        let cause = source.to_string();
        let err = ResolveError::transport("http://127.0.0.1:1/", source);
        assert_eq!(err.to_string(), "request to http://127.0.0.1:1/ failed");
        let chained = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(chained.matches(&cause).count(), 1);
    }
}
