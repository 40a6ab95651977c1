use super::traits::BuildIdValidator;
use crate::error::{ProvisionError, ProvisionResult};

const MAX_BUILD_ID_LEN: usize = 64;

/// Accepts alphanumerics plus `.-+_`, at most 64 characters, never `..`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternBuildIdValidator;

impl BuildIdValidator for PatternBuildIdValidator {
    fn validate_build_id(&self, build: &str) -> bool {
        let mut chars = build.chars();
        let first_ok = chars.next().map_or(false, |c| c.is_ascii_alphanumeric());
        first_ok
            && build.len() <= MAX_BUILD_ID_LEN
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
            && !build.contains("..")
    }
}

/// Reject `build` with [`ProvisionError::InvalidBuildIdentifier`] unless the validator accepts it.
pub fn ensure_valid(validator: &dyn BuildIdValidator, build: &str) -> ProvisionResult<()> {
    if validator.validate_build_id(build) {
        Ok(())
    } else {
        log::warn!("Rejected build identifier {:?}", build);
        Err(ProvisionError::InvalidBuildIdentifier(build.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_loader_builds() {
        let v = PatternBuildIdValidator;
        for ok in ["47.2.0", "21.1.65", "20.4.80-beta", "1.21.11.01", "0.16.5+build.1", "130"] {
            assert!(v.validate_build_id(ok), "{} should be accepted", ok);
        }
    }

    #[test]
    fn rejects_path_and_url_metacharacters() {
        let v = PatternBuildIdValidator;
        let too_long = "9".repeat(65);
        for bad in [
            "",
            "../../etc/passwd",
            "1..2",
            "47.2.0/evil",
            "47.2.0?x=1",
            "a b",
            ".hidden",
            "-rf",
            too_long.as_str(),
        ] {
            assert!(!v.validate_build_id(bad), "{:?} should be rejected", bad);
        }
        assert!(matches!(
            ensure_valid(&v, "x/y"),
            Err(ProvisionError::InvalidBuildIdentifier(_))
        ));
    }
}
