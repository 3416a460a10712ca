use serde::Deserialize;

/// One line of the agent's streaming JSON output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentMessage {
    System {
        #[serde(default)]
        subtype: Option<String>,
    },
    Assistant {
        message: AssistantBody,
    },
    Result(ResultMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssistantBody {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AgentMessage {
    pub fn text(text: impl Into<String>) -> Self {
        AgentMessage::Assistant {
            message: AssistantBody { content: vec![ContentBlock::Text { text: text.into() }] },
        }
    }

    pub fn success() -> Self {
        AgentMessage::Result(ResultMessage {
            subtype: Some("success".to_string()),
            is_error: false,
            result: None,
            duration_ms: None,
            num_turns: None,
            session_id: None,
        })
    }

    pub fn failure(subtype: &str, detail: Option<&str>) -> Self {
        AgentMessage::Result(ResultMessage {
            subtype: Some(subtype.to_string()),
            is_error: true,
            result: detail.map(str::to_string),
            duration_ms: None,
            num_turns: None,
            session_id: None,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::System { .. } => "system",
            AgentMessage::Assistant { .. } => "assistant",
            AgentMessage::Result(_) => "result",
            AgentMessage::Other => "other",
        }
    }
}
