use ahash::AHasher;
use serde_json::{Value, json};
use std::hash::Hasher;
use std::sync::Arc;

/// Payload of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized to JSON before sending.
    Json(Value),
    /// Sent verbatim.
    Text(String),
    Form(FormPayload),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Form(_))
    }

    /// JSON view of the body used to derive request keys.
    pub fn fingerprint_source(&self) -> Value {
        match self {
            RequestBody::Json(value) => value.clone(),
            RequestBody::Text(text) => Value::String(text.clone()),
            RequestBody::Form(form) => form.fingerprint_source(),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<FormPayload> for RequestBody {
    fn from(form: FormPayload) -> Self {
        RequestBody::Form(form)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Arc<[u8]>,
    },
}

/// Multipart form kept in a replayable shape; retries rebuild the wire form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormPayload {
    parts: Vec<(String, FormPart)>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), FormPart::Text(value.into())));
        self
    }

    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                mime: mime.map(str::to_string),
                bytes: bytes.into(),
            },
        ));
        self
    }

    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }

    pub fn to_multipart(&self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let mut form = reqwest::multipart::Form::new();
        for (name, part) in &self.parts {
            form = match part {
                FormPart::Text(value) => form.text(name.clone(), value.clone()),
                FormPart::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file_part =
                        reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file_part = file_part.mime_str(mime)?;
                    }
                    form.part(name.clone(), file_part)
                }
            };
        }
        Ok(form)
    }

    fn fingerprint_source(&self) -> Value {
        let parts: Vec<Value> = self
            .parts
            .iter()
            .map(|(name, part)| match part {
                FormPart::Text(value) => json!([name, value]),
                FormPart::File {
                    file_name, bytes, ..
                } => {
                    let mut hasher = AHasher::default();
                    hasher.write(bytes);
                    json!([name, {"file": file_name, "len": bytes.len(), "hash": hasher.finish()}])
                }
            })
            .collect();
        json!({ "multipart": parts })
    }
}
