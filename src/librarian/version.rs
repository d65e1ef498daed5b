use semver::Version;

/// Matches concrete versions against comma-conjoined comparator sets:
/// `>=1.0, <2.0`, `==1.4.2`, `!=0.9`, `*`. Invalid versions never match.
pub struct VersionMatcher;

impl VersionMatcher {
    pub fn matches(version: &str, specifier: &str) -> bool {
        let spec = specifier.trim();
        if spec.is_empty() || spec == "*" {
            return true;
        }
        let Some(v) = Self::parse(version) else {
            return false;
        };
        spec.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .all(|c| Self::comparator_matches(&v, c))
    }

    pub fn is_valid(version: &str) -> bool {
        Self::parse(version).is_some()
    }

    /// Lenient parse: strips a leading `v`/`=` and a trailing `+`, pads
    /// partial versions (`2.28` -> `2.28.0`).
    pub fn parse(version: &str) -> Option<Version> {
        let cleaned = version
            .trim()
            .trim_start_matches(['v', '='])
            .trim_end_matches('+');
        if cleaned.is_empty() {
            return None;
        }
        if let Ok(v) = Version::parse(cleaned) {
            return Some(v);
        }
        let dots = cleaned.chars().filter(|&c| c == '.').count();
        let padded = match dots {
            0 => format!("{cleaned}.0.0"),
            1 => format!("{cleaned}.0"),
            _ => return None,
        };
        Version::parse(&padded).ok()
    }

    fn comparator_matches(v: &Version, comparator: &str) -> bool {
        let (op, rest) = if let Some(r) = comparator.strip_prefix(">=") {
            (">=", r)
        } else if let Some(r) = comparator.strip_prefix("<=") {
            ("<=", r)
        } else if let Some(r) = comparator.strip_prefix("==") {
            ("==", r)
        } else if let Some(r) = comparator.strip_prefix("!=") {
            ("!=", r)
        } else if let Some(r) = comparator.strip_prefix('>') {
            (">", r)
        } else if let Some(r) = comparator.strip_prefix('<') {
            ("<", r)
        } else if let Some(r) = comparator.strip_prefix('=') {
            ("==", r)
        } else {
            ("==", comparator)
        };

        let Some(bound) = Self::parse(rest) else {
            return false;
        };
        match op {
            ">=" => *v >= bound,
            "<=" => *v <= bound,
            ">" => *v > bound,
            "<" => *v < bound,
            "!=" => *v != bound,
            _ => *v == bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_empty_match_everything() {
        assert!(VersionMatcher::matches("1.2.3", "*"));
        assert!(VersionMatcher::matches("1.2.3", ""));
        assert!(VersionMatcher::matches("0.0.1", "  "));
    }

    #[test]
    fn range_conjunction() {
        assert!(VersionMatcher::matches("1.5.0", ">=1.0.0, <2.0.0"));
        assert!(!VersionMatcher::matches("2.1.0", ">=1.0.0, <2.0.0"));
        assert!(!VersionMatcher::matches("0.9.0", ">=1.0.0, <2.0.0"));
    }

    #[test]
    fn equality_and_negation() {
        assert!(VersionMatcher::matches("1.4.2", "==1.4.2"));
        assert!(!VersionMatcher::matches("1.4.3", "==1.4.2"));
        assert!(VersionMatcher::matches("1.4.3", "!=1.4.2"));
        assert!(!VersionMatcher::matches("1.4.2", "!=1.4.2"));
    }

    #[test]
    fn partial_versions_pad() {
        assert!(VersionMatcher::matches("2.28", "==2.28.0"));
        assert!(VersionMatcher::matches("3", ">=2.0"));
        assert!(VersionMatcher::is_valid("2.28"));
    }

    #[test]
    fn invalid_versions_never_match() {
        assert!(!VersionMatcher::matches("not-a-version", ">=1.0"));
        assert!(!VersionMatcher::is_valid("banana"));
    }

    #[test]
    fn plus_suffix_is_tolerated() {
        assert!(VersionMatcher::matches("3.10", ">=3.0"));
        assert_eq!(
            VersionMatcher::parse("3.0+"),
            Some(Version::new(3, 0, 0))
        );
    }
}
