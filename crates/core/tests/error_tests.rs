// ═══════════════════════════════════════════════════════════════════
// Error Tests — Display messages, classification, From conversions
// ═══════════════════════════════════════════════════════════════════

use crypto_history_core::errors::CoreError;

// ═══════════════════════════════════════════════════════════════════
// Display
// ═══════════════════════════════════════════════════════════════════

mod display {
    use super::*;

    #[test]
    fn not_mapped() {
        let err = CoreError::NotMapped {
            symbol: "XYZ".into(),
        };
        assert_eq!(err.to_string(), "XYZ: no mapping");
    }

    #[test]
    fn rate_limited() {
        let err = CoreError::RateLimited {
            status: 429,
            attempts: 4,
        };
        assert_eq!(err.to_string(), "rate limited (HTTP 429) after 4 attempts");
    }

    #[test]
    fn upstream() {
        let err = CoreError::Upstream {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "upstream error (HTTP 503): Service Unavailable");
    }

    #[test]
    fn http() {
        let err = CoreError::Http {
            status: 404,
            message: "coin not found".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404: coin not found");
    }

    #[test]
    fn storage_variants() {
        assert_eq!(
            CoreError::InvalidFileFormat("bad magic".into()).to_string(),
            "Invalid file format: bad magic"
        );
        assert_eq!(
            CoreError::UnsupportedVersion(9).to_string(),
            "Unsupported file version: 9"
        );
        assert_eq!(
            CoreError::FileIO("disk full".into()).to_string(),
            "File I/O error: disk full"
        );
    }

    #[test]
    fn config() {
        assert_eq!(
            CoreError::Config("CG_THROTTLE_MS=\"abc\"".into()).to_string(),
            "Invalid configuration: CG_THROTTLE_MS=\"abc\""
        );
    }
}

// ═══════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════

mod classification {
    use super::*;

    #[test]
    fn only_rate_limited_is_a_rate_limit() {
        assert!(CoreError::RateLimited {
            status: 418,
            attempts: 1
        }
        .is_rate_limit());
        assert!(!CoreError::Upstream {
            status: 503,
            message: String::new()
        }
        .is_rate_limit());
        assert!(!CoreError::Http {
            status: 429,
            message: String::new()
        }
        .is_rate_limit());
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(CoreError::Network("timeout".into()).is_retryable());
        assert!(CoreError::MalformedResponse("eof".into()).is_retryable());
        assert!(CoreError::Upstream {
            status: 500,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn permanent_failures_are_not_retryable() {
        assert!(!CoreError::Http {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!CoreError::NotMapped {
            symbol: "XYZ".into()
        }
        .is_retryable());
        assert!(!CoreError::Config(String::new()).is_retryable());
    }
}

// ═══════════════════════════════════════════════════════════════════
// From conversions
// ═══════════════════════════════════════════════════════════════════

mod conversions {
    use super::*;

    #[test]
    fn from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::FileIO(ref msg) if msg.contains("read-only")));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::MalformedResponse(_)));
    }

    #[test]
    fn from_bincode_error() {
        let bin_err = bincode::deserialize::<String>(&[0xFF]).unwrap_err();
        let err: CoreError = bin_err.into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn from_reqwest_error_drops_the_query() {
        let reqwest_err = reqwest::Client::new()
            .get("http://127.0.0.1:9/coins/bitcoin?x_cg_demo_api_key=leaked")
            .send()
            .await
            .unwrap_err();

        let err: CoreError = reqwest_err.into();

        assert!(matches!(err, CoreError::Network(_)));
        assert!(!err.to_string().contains("leaked"));
    }

    #[test]
    fn question_mark_propagates() {
        fn read_missing() -> Result<Vec<u8>, CoreError> {
            Ok(std::fs::read("/definitely/not/here.bin")?)
        }
        assert!(matches!(read_missing(), Err(CoreError::FileIO(_))));
    }
}
