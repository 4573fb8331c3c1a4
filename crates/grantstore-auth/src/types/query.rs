//! List queries over requests, clients and users.
//!
//! Unset fields do not filter.

use grantstore_storage::DocumentFilter;

/// Filter for listing requests of one artifact kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestQuery {
    /// Only artifacts of this request.
    pub request_id: Option<String>,
    /// Only requests issued to this client.
    pub client_id: Option<String>,
    /// Only requests issued for this user.
    pub user_id: Option<String>,
    /// Requests whose requested scopes include all of these.
    pub all_scopes: Vec<String>,
    /// Requests whose granted scopes include any of these.
    pub any_granted_scopes: Vec<String>,
}

impl RequestQuery {
    pub(crate) fn to_filter(&self) -> DocumentFilter {
        DocumentFilter::new()
            .equals_opt("requestId", self.request_id.clone())
            .equals_opt("clientId", self.client_id.clone())
            .equals_opt("userId", self.user_id.clone())
            .all_of("scopes", self.all_scopes.iter().cloned())
            .any_of("grantedScopes", self.any_granted_scopes.iter().cloned())
    }
}

/// Filter for listing clients or users.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryQuery {
    /// Records holding all of these scopes.
    pub all_scopes: Vec<String>,
    /// Records holding any of these scopes.
    pub any_scopes: Vec<String>,
    /// Only enabled (`false`) or disabled (`true`) records.
    pub disabled: Option<bool>,
}

impl DirectoryQuery {
    pub(crate) fn to_filter(&self) -> DocumentFilter {
        DocumentFilter::new()
            .all_of("scopes", self.all_scopes.iter().cloned())
            .any_of("scopes", self.any_scopes.iter().cloned())
            .equals_opt("disabled", self.disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(RequestQuery::default().to_filter().is_empty());
        assert!(DirectoryQuery::default().to_filter().is_empty());
    }

    #[test]
    fn test_request_query_filter() {
        let query = RequestQuery {
            client_id: Some("app".into()),
            all_scopes: vec!["openid".into()],
            ..Default::default()
        };
        let filter = query.to_filter();
        assert!(filter.matches(&json!({"clientId": "app", "scopes": ["openid", "email"]})));
        assert!(!filter.matches(&json!({"clientId": "other", "scopes": ["openid"]})));
        assert!(!filter.matches(&json!({"clientId": "app", "scopes": ["email"]})));
    }

    #[test]
    fn test_directory_query_disabled() {
        let filter = DirectoryQuery {
            disabled: Some(false),
            ..Default::default()
        }
        .to_filter();
        assert!(filter.matches(&json!({"disabled": false})));
        assert!(!filter.matches(&json!({"disabled": true})));
    }
}
