use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::constants::site;
use crate::error::{ImportError, ImportResult};

/// A validated showcase profile URL with its optional sub-collection selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowcaseTarget {
    /// Page URL as supplied (trimmed)
    pub url: String,
    /// Profile id segment following `showcase/profile/`
    pub profile_id: String,
    /// Sub-collection selected through the `collection` or `id` query parameter
    pub collection_id: Option<String>,
}

impl ShowcaseTarget {
    pub fn parse(input: &str) -> ImportResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ImportError::MissingUrl);
        }

        let parsed = Url::parse(trimmed).map_err(|e| ImportError::InvalidUrl(e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default();
        if host != site::SHOWCASE_HOST {
            return Err(ImportError::WrongHost {
                expected: site::SHOWCASE_HOST.to_string(),
                actual: host.to_string(),
            });
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let profile_id = segments
            .windows(3)
            .find(|window| window[0].eq_ignore_ascii_case("showcase") && window[1].eq_ignore_ascii_case("profile"))
            .map(|window| window[2].to_string())
            .ok_or(ImportError::MissingProfileId)?;

        let query_value = |name: &str| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let collection_id = query_value("collection").or_else(|| query_value("id"));

        Ok(Self {
            url: trimmed.to_string(),
            profile_id,
            collection_id,
        })
    }
}

impl fmt::Display for ShowcaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.collection_id {
            Some(collection) => write!(f, "{} (collection: {collection})", self.profile_id),
            None => write!(f, "{}", self.profile_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_profile_and_collection() {
        let target =
            ShowcaseTarget::parse(" https://app.getcollectr.com/showcase/profile/abc-123?collection=c9 ").unwrap();
        assert_eq!(target.profile_id, "abc-123");
        assert_eq!(target.collection_id.as_deref(), Some("c9"));
        assert_eq!(target.to_string(), "abc-123 (collection: c9)");
    }

    #[test]
    fn test_id_query_is_secondary_selector() {
        let target = ShowcaseTarget::parse("https://app.getcollectr.com/showcase/profile/p1?id=77&collection=%20").unwrap();
        assert_eq!(target.collection_id.as_deref(), Some("77"));
    }

    #[rstest]
    #[case("", "MissingUrl")]
    #[case("not a url", "InvalidUrl")]
    #[case("https://getcollectr.com/showcase/profile/p1", "WrongHost")]
    #[case("https://app.getcollectr.com/showcase/p1", "MissingProfileId")]
    fn test_parse_rejects(#[case] input: &str, #[case] expected: &str) {
        let err = ShowcaseTarget::parse(input).unwrap_err();
        let variant = match err {
            ImportError::MissingUrl => "MissingUrl",
            ImportError::InvalidUrl(_) => "InvalidUrl",
            ImportError::WrongHost { .. } => "WrongHost",
            ImportError::MissingProfileId => "MissingProfileId",
            _ => "other",
        };
        assert_eq!(variant, expected);
        assert!(err.is_user_error());
    }
}
