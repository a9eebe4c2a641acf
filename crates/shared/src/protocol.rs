use serde::{Deserialize, Serialize};

/// Remote procedure calls issued by the chat UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ApiRequest {
    #[serde(rename = "messages.getWebPage")]
    GetWebPage { url: String, hash: i32 },
}

impl ApiRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ApiRequest::GetWebPage { .. } => "messages.getWebPage",
        }
    }
}
