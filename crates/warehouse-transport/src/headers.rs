//! Standard request headers (spec §4.5).

use uuid::Uuid;

/// Built once at process start from platform info (spec §9 "Global
/// mutable state": "the HTTP user-agent string computed once from
/// platform info at process start"). Confined to this module.
static USER_AGENT: std::sync::OnceLock<String> = std::sync::OnceLock::new();

pub fn user_agent() -> &'static str {
    USER_AGENT.get_or_init(|| {
        format!(
            "warehouse-driver-rs/{} ({}; rustc)",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
        )
    })
}

/// Headers common to every request (spec §4.5): `User-Agent`,
/// `Content-Type`, `Accept`, plus `Authorization` when a session token is
/// present and `X-Snowflake-Service` when session affinity is set.
///
/// `request_id` is the same id the caller put in the `requestId`/
/// `request_guid` query parameters; it must be the SAME value across every
/// retry of one logical statement (Invariant 3, spec §3.2), never a fresh
/// one minted per call.
pub struct StandardHeaders {
    pub request_id: Uuid,
    pub session_token: Option<String>,
    pub service_name: Option<String>,
    pub retry_reason: Option<String>,
}

impl StandardHeaders {
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder
            .header("User-Agent", user_agent())
            .header("Content-Type", "application/json")
            .header("Accept", "application/snowflake")
            .header("X-Request-Guid", self.request_id.to_string());

        if let Some(token) = &self.session_token {
            builder = builder.header("Authorization", format!("Snowflake Token=\"{token}\""));
        }
        if let Some(service) = &self.service_name {
            builder = builder.header("X-Snowflake-Service", service);
        }
        if let Some(reason) = &self.retry_reason {
            builder = builder.header("X-Snowflake-Retry-Reason", reason);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_is_stable_across_calls() {
        assert_eq!(user_agent(), user_agent());
        assert!(user_agent().starts_with("warehouse-driver-rs/"));
    }

    #[test]
    fn apply_sends_the_given_request_id_not_a_fresh_one() {
        let request_id = Uuid::new_v4();
        let headers = StandardHeaders {
            request_id,
            session_token: None,
            service_name: None,
            retry_reason: None,
        };
        let client = reqwest::Client::new();
        let built = headers
            .apply(client.get("http://localhost/"))
            .build()
            .unwrap();
        let guid = built.headers().get("X-Request-Guid").unwrap().to_str().unwrap();
        assert_eq!(guid, request_id.to_string());
    }
}
