use serde::{Deserialize, Serialize};

/// JSON envelope returned by the HTTP publish endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeMsg {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl CodeMsg {
    pub fn ok() -> Self {
        Self {
            code: 200,
            msg: None,
        }
    }

    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
        }
    }
}
