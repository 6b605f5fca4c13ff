//! `POST /send-message` and `POST /send-media`.

use std::{collections::BTreeMap, sync::Arc};

use {
    axum::{
        Form, Json,
        extract::{FromRequest, Multipart, Request, State, multipart::MultipartRejection},
        http::{StatusCode, header::CONTENT_TYPE},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use wagate_whatsapp::{
    ClientError, MessageContent, MessageMedia, Receipt, RecipientId, SendOptions, format_recipient,
};

use crate::state::GatewayState;

const INVALID_VALUE: &str = "Invalid value";
const NOT_REGISTERED: &str = "Nomor tidak terdaftar";
const DEFAULT_FILENAME: &str = "file";

/// Upload ceiling for `send-media`, well above axum's 2 MB default.
pub const MAX_MEDIA_BYTES: usize = 64 * 1024 * 1024;

/// Field name → error message, sorted for stable output.
pub type FieldErrors = BTreeMap<&'static str, &'static str>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request fields: {0:?}")]
    Validation(FieldErrors),
    #[error("recipient is not a WhatsApp user")]
    NotRegistered,
    #[error(transparent)]
    Delivery(#[from] ClientError),
}

impl ApiError {
    fn invalid(fields: impl IntoIterator<Item = &'static str>) -> Self {
        Self::Validation(fields.into_iter().map(|f| (f, INVALID_VALUE)).collect())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"status": false, "message": fields})),
            )
                .into_response(),
            Self::NotRegistered => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"status": false, "message": NOT_REGISTERED})),
            )
                .into_response(),
            Self::Delivery(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": false, "response": e.detail()})),
            )
                .into_response(),
        }
    }
}

fn delivered(receipt: Receipt) -> Response {
    Json(json!({"status": true, "response": receipt})).into_response()
}

// ── send-message ─────────────────────────────────────────────────────────────

/// Raw `send-message` fields. JSON callers may send the number as a JSON
/// number, so fields are kept as values until validation.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub number: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SendMessageForm {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<SendMessageForm> for SendMessageRequest {
    fn from(form: SendMessageForm) -> Self {
        Self {
            number: form.number.map(Value::String),
            message: form.message.map(Value::String),
        }
    }
}

/// Accepts either a JSON or a urlencoded form body. An unparseable body is
/// treated as one with no fields.
pub struct SendMessageBody(pub SendMessageRequest);

impl<S> FromRequest<S> for SendMessageBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let parsed = if is_json {
            Json::<SendMessageRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| e.body_text())
        } else {
            Form::<SendMessageForm>::from_request(req, state)
                .await
                .map(|Form(body)| body.into())
                .map_err(|e| e.body_text())
        };

        Ok(Self(parsed.unwrap_or_else(|reason| {
            debug!(reason = %reason, "send-message: unreadable body");
            SendMessageRequest::default()
        })))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Text of a JSON field: strings as-is, non-negative integers in decimal.
/// Anything else counts as missing.
fn field_text(value: &Option<Value>) -> Option<String> {
    let text = match value.as_ref()? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_u64()?.to_string(),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

fn recipient(state: &GatewayState, number: &str) -> Result<RecipientId, ApiError> {
    format_recipient(number, &state.country_code).map_err(|e| {
        debug!(error = %e, "rejecting unformattable number");
        ApiError::invalid(["number"])
    })
}

pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    SendMessageBody(body): SendMessageBody,
) -> Result<Response, ApiError> {
    let (number, message) = match (field_text(&body.number), field_text(&body.message)) {
        (Some(n), Some(m)) => (n, m),
        (number, message) => {
            let missing = [("number", number.is_none()), ("message", message.is_none())]
                .into_iter()
                .filter_map(|(field, missing)| missing.then_some(field));
            return Err(ApiError::invalid(missing));
        },
    };
    let to = recipient(&state, &number)?;

    // Run on its own task so an early caller disconnect does not cancel the send.
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let client = &task_state.client;
        if !client.is_registered_user(&to).await? {
            debug!(to = %to, "send-message: recipient not registered");
            return Err(ApiError::NotRegistered);
        }
        let receipt = client
            .send_message(&to, MessageContent::Text { body: message }, SendOptions::default())
            .await
            .inspect_err(|e| warn!(to = %to, error = %e, "send-message failed"))?;
        info!(to = %to, "send-message delivered");
        Ok::<_, ApiError>(delivered(receipt))
    })
    .await
    .map_err(|e| ApiError::Delivery(ClientError::Transport(format!("send task failed: {e}"))))?
}

// ── send-media ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MediaForm {
    number: Option<String>,
    caption: Option<String>,
    file: Option<MessageMedia>,
}

async fn read_media_form(mut multipart: Multipart) -> MediaForm {
    let mut form = MediaForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "send-media: malformed multipart body");
                break;
            },
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "number" => form.number = field.text().await.ok(),
            "caption" => form.caption = field.text().await.ok(),
            "file" => {
                let mimetype = field.content_type().unwrap_or_default().to_string();
                let filename = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        form.file = Some(MessageMedia::from_bytes(&mimetype, &bytes, Some(filename)));
                    },
                    Err(e) => warn!(error = %e, "send-media: failed to read file part"),
                }
            },
            _ => {},
        }
    }
    form
}

pub async fn send_media(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = match multipart {
        Ok(multipart) => read_media_form(multipart).await,
        Err(e) => {
            debug!(reason = %e.body_text(), "send-media: not a multipart body");
            MediaForm::default()
        },
    };

    let number = present(&form.number).map(str::to_string);
    let (number, media) = match (number, form.file) {
        (Some(n), Some(m)) => (n, m),
        (number, file) => {
            let missing = [("number", number.is_none()), ("file", file.is_none())]
                .into_iter()
                .filter_map(|(field, missing)| missing.then_some(field));
            return Err(ApiError::invalid(missing));
        },
    };
    let to = recipient(&state, &number)?;
    let options = SendOptions {
        caption: form.caption.filter(|c| !c.is_empty()),
        ..Default::default()
    };

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let bytes = media.len();
        let receipt = task_state
            .client
            .send_message(&to, MessageContent::Media(media), options)
            .await
            .inspect_err(|e| warn!(to = %to, error = %e, "send-media failed"))?;
        info!(to = %to, bytes, "send-media delivered");
        Ok::<_, ApiError>(delivered(receipt))
    })
    .await
    .map_err(|e| ApiError::Delivery(ClientError::Transport(format!("send task failed: {e}"))))?
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            server::build_gateway_app,
            test_support::{FakeClient, SendOutcome},
        },
        axum::{body::Body, http::Request as HttpRequest},
        tower::ServiceExt,
        wagate_whatsapp::CredentialCell,
    };

    fn app(client: Arc<FakeClient>) -> axum::Router {
        build_gateway_app(GatewayState::new(client, CredentialCell::default(), "62"))
    }

    async fn call(app: axum::Router, req: HttpRequest<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_request(body: Value) -> HttpRequest<Body> {
        HttpRequest::post("/send-message")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const BOUNDARY: &str = "wagate-test-boundary";

    fn multipart_request(number: Option<&str>, caption: Option<&str>, file: bool) -> HttpRequest<Body> {
        let mut body = String::new();
        let mut text = |name: &str, value: &str| {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        };
        if let Some(n) = number {
            text("number", n);
        }
        if let Some(c) = caption {
            text("caption", c);
        }
        if file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        HttpRequest::post("/send-media")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn empty_number_is_a_field_error() {
        let client = FakeClient::shared();
        let (status, body) = call(
            app(client.clone()),
            json_request(json!({"number": "", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"status": false, "message": {"number": "Invalid value"}}));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn every_missing_field_is_listed() {
        let (status, body) = call(app(FakeClient::shared()), json_request(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["message"],
            json!({"number": "Invalid value", "message": "Invalid value"})
        );
    }

    #[tokio::test]
    async fn letters_in_number_are_a_field_error() {
        let (status, body) = call(
            app(FakeClient::shared()),
            json_request(json!({"number": "call me", "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], json!({"number": "Invalid value"}));
    }

    #[tokio::test]
    async fn unregistered_number_is_never_sent() {
        let client = Arc::new(FakeClient {
            registered: false,
            ..Default::default()
        });
        let (status, body) = call(
            app(client.clone()),
            json_request(json!({"number": "0811", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"status": false, "message": "Nomor tidak terdaftar"}));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn registered_number_passes_receipt_through() {
        let client = FakeClient::shared();
        let (status, body) = call(
            app(client.clone()),
            json_request(json!({"number": "0811-222", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": true, "response": {"id": "true_62811@c.us_XYZ", "ack": 1}})
        );
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "62811222@c.us");
        assert_eq!(sent[0].1, MessageContent::Text { body: "hi".into() });
    }

    #[tokio::test]
    async fn form_body_is_accepted() {
        let client = FakeClient::shared();
        let req = HttpRequest::post("/send-message")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("number=%2B62811&message=halo"))
            .unwrap();
        let (status, _) = call(app(client.clone()), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(client.sent()[0].0.as_str(), "62811@c.us");
    }

    #[tokio::test]
    async fn delivery_failure_is_500_with_detail() {
        let client = Arc::new(FakeClient {
            outcome: SendOutcome::Rejected(json!({"error": "not connected"})),
            ..Default::default()
        });
        let (status, body) = call(
            app(client),
            json_request(json!({"number": "0811", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"status": false, "response": {"error": "not connected"}}));
    }

    #[tokio::test]
    async fn failing_registration_check_is_500() {
        let client = Arc::new(FakeClient {
            fail_registration: true,
            ..Default::default()
        });
        let (status, body) = call(
            app(client.clone()),
            json_request(json!({"number": "0811", "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], false);
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn media_is_sent_with_caption() {
        let client = FakeClient::shared();
        let (status, body) = call(
            app(client.clone()),
            multipart_request(Some("0811"), Some("look"), true),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], true);
        let sent = client.sent();
        let (to, content, options) = &sent[0];
        assert_eq!(to.as_str(), "62811@c.us");
        assert_eq!(
            content,
            &MessageContent::Media(MessageMedia::from_bytes(
                "image/png",
                b"PNGDATA",
                Some("cat.png".into())
            ))
        );
        assert_eq!(options.caption.as_deref(), Some("look"));
    }

    #[tokio::test]
    async fn media_without_number_or_file_is_rejected() {
        let client = FakeClient::shared();
        let (status, body) = call(app(client.clone()), multipart_request(None, None, false)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["message"],
            json!({"number": "Invalid value", "file": "Invalid value"})
        );
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn numeric_number_is_accepted() {
        let client = FakeClient::shared();
        let (status, body) = call(
            app(client.clone()),
            json_request(json!({"number": 628123456789_u64, "message": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], true);
        assert_eq!(client.sent()[0].0.as_str(), "628123456789@c.us");
    }

    #[tokio::test]
    async fn only_failing_fields_are_listed() {
        let (status, body) = call(
            app(FakeClient::shared()),
            json_request(json!({"number": 62811, "message": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], json!({"message": "Invalid value"}));

        let (status, body) = call(
            app(FakeClient::shared()),
            json_request(json!({"number": true, "message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], json!({"number": "Invalid value"}));
    }

    #[tokio::test]
    async fn media_with_letters_in_number_is_a_field_error() {
        let client = FakeClient::shared();
        let (status, body) = call(
            app(client.clone()),
            multipart_request(Some("call me"), None, true),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, json!({"status": false, "message": {"number": "Invalid value"}}));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn media_delivery_failure_is_500_with_detail() {
        let client = Arc::new(FakeClient {
            outcome: SendOutcome::Rejected(json!({"error": "media too large"})),
            ..Default::default()
        });
        let (status, body) = call(app(client), multipart_request(Some("0811"), None, true)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"status": false, "response": {"error": "media too large"}}));
    }
}
