use std::time::Duration;

use anyhow::{Context, Result};
use meallens_contracts::foods::{classify_registration_response, MealSlot, RegistrationOutcome};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;

use crate::error_chain_text;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

pub trait MealRegistrar {
    /// Exactly one registration attempt. Failures are folded into the outcome.
    fn register(&self, food_name: &str, slot: MealSlot) -> RegistrationOutcome;
}

#[derive(Debug, Serialize)]
struct RegisterMealRequest<'a> {
    food_name: &'a str,
    meal_type: MealSlot,
}

/// Posts confirmed foods to `{server}/register-meal`.
pub struct HttpMealRegistrar {
    endpoint: String,
    http: HttpClient,
}

impl HttpMealRegistrar {
    pub fn new(server_url: &str) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(REGISTRATION_TIMEOUT)
            .build()
            .context("failed to build registration HTTP client")?;
        Ok(Self::with_http(server_url, http))
    }

    pub fn with_http(server_url: &str, http: HttpClient) -> Self {
        Self {
            endpoint: format!("{}/register-meal", server_url.trim().trim_end_matches('/')),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MealRegistrar for HttpMealRegistrar {
    fn register(&self, food_name: &str, slot: MealSlot) -> RegistrationOutcome {
        let body = RegisterMealRequest {
            food_name,
            meal_type: slot,
        };
        match self.http.post(&self.endpoint).json(&body).send() {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().unwrap_or_default();
                classify_registration_response(status, &text)
            }
            Err(err) => RegistrationOutcome::Failed {
                status: None,
                detail: error_chain_text(&err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::test_server::serve_once;

    fn registrar_for(base: &str) -> Result<HttpMealRegistrar> {
        let http = HttpClient::builder()
            .no_proxy()
            .timeout(REGISTRATION_TIMEOUT)
            .build()?;
        Ok(HttpMealRegistrar::with_http(base, http))
    }

    #[test]
    fn endpoint_joins_base_without_double_slash() -> Result<()> {
        let registrar = registrar_for("http://meals.test/ ")?;
        assert_eq!(registrar.endpoint(), "http://meals.test/register-meal");
        Ok(())
    }

    #[test]
    fn posts_food_and_korean_meal_type() -> Result<()> {
        let (base, server) = serve_once(200, r#"{"ok":true}"#)?;
        let outcome = registrar_for(&base)?.register("라면", MealSlot::Lunch);
        assert_eq!(outcome, RegistrationOutcome::Registered);

        let request = server.join().expect("server thread panicked")?;
        assert_eq!(request.request_line, "POST /register-meal HTTP/1.1");
        let body: Value = serde_json::from_str(&request.body)?;
        assert_eq!(body, json!({ "food_name": "라면", "meal_type": "점심" }));
        Ok(())
    }

    #[test]
    fn conflict_detail_is_a_warning() -> Result<()> {
        let (base, server) = serve_once(400, r#"{"detail":"이미 등록된 음식입니다"}"#)?;
        let outcome = registrar_for(&base)?.register("김밥", MealSlot::Breakfast);
        assert_eq!(
            outcome,
            RegistrationOutcome::Duplicate {
                detail: "이미 등록된 음식입니다".to_string()
            }
        );
        server.join().expect("server thread panicked")?;
        Ok(())
    }

    #[test]
    fn server_error_keeps_status_and_body() -> Result<()> {
        let (base, server) = serve_once(503, "maintenance")?;
        let outcome = registrar_for(&base)?.register("김밥", MealSlot::Dinner);
        assert_eq!(
            outcome,
            RegistrationOutcome::Failed {
                status: Some(503),
                detail: "maintenance".to_string()
            }
        );
        server.join().expect("server thread panicked")?;
        Ok(())
    }

    #[test]
    fn connection_refused_is_reported_not_raised() -> Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let outcome = registrar_for(&format!("http://{addr}"))?.register("김밥", MealSlot::Lunch);
        match outcome {
            RegistrationOutcome::Failed { status, detail } => {
                assert_eq!(status, None);
                assert!(!detail.is_empty());
            }
            other => panic!("expected transport failure, got {other:?}"),
        }
        Ok(())
    }
}
