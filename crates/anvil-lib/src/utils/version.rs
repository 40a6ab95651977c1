use std::cmp::Ordering;

/// A dot-separated version compared component-wise as integers.
///
/// Missing trailing components count as 0, so `1.21` == `1.21.0`. A component
/// that is not a number contributes its leading digits (`"01-beta"` -> 1), or 0.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NumericVersion(String);

impl NumericVersion {
    pub fn new(v: &str) -> Self {
        NumericVersion(v.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> Vec<u64> {
        self.0.split('.').map(leading_number).collect()
    }
}

fn leading_number(part: &str) -> u64 {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

impl Ord for NumericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.components();
        let b = other.components();
        let len = a.len().max(b.len());

        for i in 0..len {
            let ap = a.get(i).copied().unwrap_or(0);
            let bp = b.get(i).copied().unwrap_or(0);
            match ap.cmp(&bp) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for NumericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    NumericVersion::new(a).cmp(&NumericVersion::new(b))
}

/// Sort newest first.
pub fn sort_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(b, a));
}

/// Minor component of a `1.x[.y]` Minecraft version, e.g. 20 for "1.20.4".
pub fn minecraft_minor(mc_version: &str) -> Option<u32> {
    let mut parts = mc_version.split('.');
    match parts.next()? {
        "1" => parts.next().map(|m| leading_number(m) as u32),
        _ => None,
    }
}

/// Java major version required to run the server for a Minecraft version.
pub fn required_java_major(mc_version: &str) -> u32 {
    match minecraft_minor(mc_version) {
        Some(minor) if minor >= 21 => 21,
        Some(minor) if minor >= 17 => 17,
        Some(minor) if minor >= 12 => 11,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_sorting() {
        let mut versions = vec![
            "1.20.10".to_string(),
            "1.21.2".to_string(),
            "1.9.0".to_string(),
        ];
        sort_descending(&mut versions);
        assert_eq!(versions, vec!["1.21.2", "1.20.10", "1.9.0"]);
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(compare_versions("1.0.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.21.11.01", "1.21.2.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.21", "1.21.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.21", "1.21.0.1"), Ordering::Less);
        // "10" beats "9" numerically even though it sorts lower as text
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    }

    #[test]
    fn test_java_mapping() {
        assert_eq!(required_java_major("1.21.1"), 21);
        assert_eq!(required_java_major("1.21"), 21);
        assert_eq!(required_java_major("1.20.4"), 17);
        assert_eq!(required_java_major("1.17"), 17);
        assert_eq!(required_java_major("1.16.5"), 11);
        assert_eq!(required_java_major("1.12.2"), 11);
        assert_eq!(required_java_major("1.7.10"), 8);
        assert_eq!(required_java_major("garbage"), 8);
    }
}
