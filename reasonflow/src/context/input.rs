//! Raw task input and its UTF-8 coercion.

/// Input accepted by [`Pipeline::call`](crate::pipeline::Pipeline::call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskInput {
    /// Already-decoded text.
    Text(String),
    /// Raw bytes, decoded lossily.
    Bytes(Vec<u8>),
}

impl TaskInput {
    /// Decodes the input, returning a warning when bytes had to be replaced.
    #[must_use]
    pub fn into_text(self) -> (String, Option<String>) {
        match self {
            Self::Text(text) => (text, None),
            Self::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => (text, None),
                Err(e) => {
                    let bytes = e.into_bytes();
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    let replaced = text.matches(char::REPLACEMENT_CHARACTER).count();
                    (
                        text,
                        Some(format!(
                            "input was not valid UTF-8; {replaced} invalid sequence(s) replaced"
                        )),
                    )
                }
            },
        }
    }
}

impl From<&str> for TaskInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TaskInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&String> for TaskInput {
    fn from(text: &String) -> Self {
        Self::Text(text.clone())
    }
}

impl From<Vec<u8>> for TaskInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for TaskInput {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
