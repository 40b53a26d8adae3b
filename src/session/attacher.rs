use http::header::{HeaderValue, AUTHORIZATION};
use tracing::warn;

use crate::cache::credential::Credential;
use crate::transport::ApiRequest;

/// Attaches `Authorization: Bearer <credential>` to outgoing requests,
/// except for paths containing one of the public route fragments.
#[derive(Debug, Clone)]
pub struct OutboundAttacher {
    public_routes: Vec<String>,
}

impl OutboundAttacher {
    pub fn new(public_routes: Vec<String>) -> Self {
        Self { public_routes }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes
            .iter()
            .any(|route| path.contains(route.as_str()))
    }

    pub fn attach(&self, request: &ApiRequest, credential: Option<&Credential>) -> ApiRequest {
        let mut outgoing = request.clone();
        let Some(credential) = credential else {
            return outgoing;
        };
        if self.is_public(&request.path) {
            return outgoing;
        }

        match HeaderValue::from_str(&credential.authorization_value()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                outgoing.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => warn!("credential is not a valid header value, sending without it: {}", e),
        }
        outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attacher() -> OutboundAttacher {
        OutboundAttacher::new(vec!["/auth/login".to_owned(), "/auth/register".to_owned()])
    }

    #[test]
    fn attaches_bearer_to_protected_routes() {
        let credential = Credential::new("C1");
        let request = ApiRequest::get("/api/jobs/");

        let outgoing = attacher().attach(&request, Some(&credential));

        assert_eq!(outgoing.header(&AUTHORIZATION), Some("Bearer C1"));
        assert_eq!(request.header(&AUTHORIZATION), None, "input must stay untouched");
        assert_eq!(outgoing.path, request.path);
        assert_eq!(outgoing.method, request.method);
    }

    #[test]
    fn skips_public_routes() {
        let credential = Credential::new("C1");
        for path in ["/api/auth/login/", "/api/auth/register/"] {
            let outgoing = attacher().attach(&ApiRequest::post(path, None), Some(&credential));
            assert_eq!(outgoing.header(&AUTHORIZATION), None, "{path} must stay anonymous");
        }
    }

    #[test]
    fn without_credential_request_is_unchanged() {
        let request = ApiRequest::get("/api/candidates/");
        assert_eq!(attacher().attach(&request, None), request);
    }

    #[test]
    fn replaces_previous_authorization() {
        let request = ApiRequest::get("/api/jobs/")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer old"));

        let outgoing = attacher().attach(&request, Some(&Credential::new("C2")));

        assert_eq!(outgoing.header(&AUTHORIZATION), Some("Bearer C2"));
    }
}
