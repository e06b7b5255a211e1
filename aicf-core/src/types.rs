//! Core domain types for aicf
//!
//! These types represent the canonical message model that normalizes
//! conversation captures from every supported source platform, plus the
//! derived extraction facts and the aggregate analysis result.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Message** | One utterance by the user, the assistant, or the system |
//! | **Conversation** | An ordered list of messages from one source platform |
//! | **Checkpoint** | A serialized conversation submitted to the pipeline |
//! | **Cache chunk** | A raw capture fragment written by a platform cache writer |
//! | **Provenance** | Whether a fact came from the summary or an individual message |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::path::PathBuf;

// ============================================
// Source platforms
// ============================================

/// Platform that produced a capture.
///
/// Closed set: adding a platform means adding a parser variant, see
/// [`crate::parse::parser_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourcePlatform {
    /// Embedded key-value log store (Augment)
    Augment,
    /// JSON, JSONL, `role: content` lines, markdown, or raw text
    Generic,
    /// Unknown origin; the parser is picked by format detection
    #[default]
    #[serde(other)]
    Unknown,
}

impl SourcePlatform {
    /// Returns the identifier used in file names and artifacts
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcePlatform::Augment => "augment",
            SourcePlatform::Generic => "generic",
            SourcePlatform::Unknown => "unknown",
        }
    }

    /// Returns the display name for this platform
    pub fn display_name(&self) -> &'static str {
        match self {
            SourcePlatform::Augment => "Augment",
            SourcePlatform::Generic => "Generic",
            SourcePlatform::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourcePlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "augment" => Ok(SourcePlatform::Augment),
            "generic" => Ok(SourcePlatform::Generic),
            "unknown" => Ok(SourcePlatform::Unknown),
            _ => Err(format!("unknown source platform: {}", s)),
        }
    }
}

// ============================================
// Messages
// ============================================

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai", alias = "model")]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Map the many spellings used by capture formats onto a role.
    ///
    /// Returns `None` for labels that are not conversation roles.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" | "human" | "you" | "me" | "request" | "prompt" => Some(Role::User),
            "assistant" | "ai" | "bot" | "model" | "agent" | "claude" | "augment"
            | "copilot" | "chatgpt" | "gpt" | "response" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_label(s).ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// A single canonical message. Immutable once a parser produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Source-assigned id, or a content digest when the source has none
    #[serde(default)]
    pub id: String,
    /// Conversation this message belongs to
    #[serde(default)]
    pub conversation_id: String,
    /// When the message was produced, if the source recorded it
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Author role
    pub role: Role,
    /// Full, unbounded message text
    pub content: String,
}

impl Message {
    /// Create a message with a deterministic id derived from its identity fields.
    pub fn new(
        conversation_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let content = content.into();
        let id = Self::digest_id(&conversation_id, role, timestamp, &content);
        Self {
            id,
            conversation_id,
            timestamp,
            role,
            content,
        }
    }

    /// Replace the id with a source-assigned one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Stable id over `(conversation, role, timestamp, content)`.
    pub fn digest_id(
        conversation_id: &str,
        role: Role,
        timestamp: Option<DateTime<Utc>>,
        content: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(conversation_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(role.as_str().as_bytes());
        hasher.update([0u8]);
        if let Some(ts) = timestamp {
            hasher.update(ts.to_rfc3339().as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("msg-{}", &digest[..16])
    }

    /// Two messages are duplicates when conversation, timestamp, role and
    /// content are identical. The id is not part of the comparison.
    pub fn is_duplicate_of(&self, other: &Message) -> bool {
        self.conversation_id == other.conversation_id
            && self.timestamp == other.timestamp
            && self.role == other.role
            && self.content == other.content
    }
}

// ============================================
// Conversations & checkpoints
// ============================================

/// An ordered conversation owned by the parser that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub source: SourcePlatform,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Build a conversation whose created/updated times come from its messages.
    pub fn from_messages(id: impl Into<String>, source: SourcePlatform, messages: Vec<Message>) -> Self {
        let now = Utc::now();
        let created_at = messages.iter().filter_map(|m| m.timestamp).min().unwrap_or(now);
        let updated_at = messages.iter().filter_map(|m| m.timestamp).max().unwrap_or(now);
        Self {
            id: id.into(),
            messages,
            source,
            created_at,
            updated_at,
        }
    }
}

/// A serialized unit of conversation work submitted to the pipeline.
///
/// On disk this is `{conversation: {...}, rawData?, timestamp, source}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub conversation: Conversation,
    /// Raw platform payload, parsed when `conversation.messages` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: SourcePlatform,
}

/// A raw capture fragment written independently by a platform cache writer.
#[derive(Debug, Clone)]
pub struct CacheChunk {
    /// Platform subdirectory the chunk was found under
    pub source_platform: SourcePlatform,
    /// Capture time, from the chunk file's modification time
    pub captured_at: DateTime<Utc>,
    /// Platform payload, unmodified
    pub raw_payload: String,
    /// Location on disk (needed to archive/delete after a merge)
    pub path: PathBuf,
    /// Ordering key (file stem; monotonic per writer)
    pub key: String,
    /// Conversation named by a per-conversation subdirectory, if any
    pub conversation_hint: Option<String>,
}

// ============================================
// Summary
// ============================================

/// Counts over the summarized messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetrics {
    pub total_messages: usize,
    pub user_messages: usize,
    pub ai_messages: usize,
    /// Sum of message lengths in characters
    pub total_characters: usize,
}

/// Lossless aggregate of a message list. See [`crate::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user_queries: String,
    pub ai_responses: String,
    pub full_conversation: String,
    pub metrics: SummaryMetrics,
    /// Where each turn body sits in the three texts. Filled by
    /// [`crate::summary::summarize`]; empty for summaries built any other way.
    #[serde(skip)]
    pub layout: TurnLayout,
}

/// Byte ranges of turn bodies (text after the `[U1] ` style marker).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnLayout {
    pub user: Vec<Range<usize>>,
    pub assistant: Vec<Range<usize>>,
    pub transcript: Vec<Range<usize>>,
}

impl ConversationSummary {
    /// True when no message contributed to this summary.
    pub fn is_empty(&self) -> bool {
        self.metrics.total_messages == 0
    }
}

// ============================================
// Extraction facts
// ============================================

/// Where an extracted fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Aggregated summary text (full multi-message context)
    ConversationSummary,
    /// A single message scanned on its own
    IndividualMessage,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::ConversationSummary => "conversation_summary",
            Provenance::IndividualMessage => "individual_message",
        }
    }
}

/// Confidence of an extracted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Impact of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
        }
    }
}

/// What the user asked for in one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIntent {
    pub timestamp: Option<DateTime<Utc>>,
    /// Complete user text of the turn
    pub intent: String,
    pub inferred_from: Provenance,
    pub confidence: Confidence,
    pub message_index: Option<usize>,
}

/// Classification of an assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Turn carries a fenced code block
    AgentAction,
    /// Plain prose response
    AiResponse,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AgentAction => "agent_action",
            ActionType::AiResponse => "ai_response",
        }
    }
}

/// What the assistant did in one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAction {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Complete assistant text of the turn
    pub details: String,
    pub source: Provenance,
    pub message_index: Option<usize>,
}

/// Classification of a technical turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// Mentions scripts, pipelines or automation
    AgentAutomation,
    /// Technical discussion without automation vocabulary
    TechnicalConversation,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::AgentAutomation => "agent_automation",
            WorkType::TechnicalConversation => "technical_conversation",
        }
    }
}

/// A technical assistant turn, captured whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalWork {
    pub timestamp: Option<DateTime<Utc>>,
    /// Complete text of the matching turn
    pub work: String,
    #[serde(rename = "type")]
    pub work_type: WorkType,
    pub source: Provenance,
    pub message_index: Option<usize>,
}

/// A decision stated somewhere in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: Option<DateTime<Utc>>,
    /// Complete clause containing the decision verb
    pub decision: String,
    /// Clause plus surrounding text
    pub context: String,
    pub impact: Impact,
    pub source: Provenance,
    pub message_index: Option<usize>,
}

/// Which side carried the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantRole {
    User,
    Assistant,
    Balanced,
}

impl DominantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DominantRole::User => "user",
            DominantRole::Assistant => "assistant",
            DominantRole::Balanced => "balanced",
        }
    }
}

/// Shape of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlow {
    /// One `{role}_{short|long}` tag per message
    pub sequence: Vec<String>,
    pub turns: usize,
    pub dominant_role: DominantRole,
}

impl Default for ConversationFlow {
    fn default() -> Self {
        Self {
            sequence: Vec::new(),
            turns: 0,
            dominant_role: DominantRole::Balanced,
        }
    }
}

/// Open work at the end of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingState {
    pub current_task: String,
    /// Deduplicated, in order of first appearance
    pub blockers: Vec<String>,
    pub next_action: String,
    pub last_update: DateTime<Utc>,
}

// ============================================
// Analysis result
// ============================================

/// Everything extracted from one conversation; the unit handed to the writer.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub conversation_id: String,
    pub source: SourcePlatform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analyzed_at: DateTime<Utc>,
    pub summary: ConversationSummary,
    pub intents: Vec<UserIntent>,
    pub actions: Vec<AiAction>,
    pub technical_work: Vec<TechnicalWork>,
    pub decisions: Vec<Decision>,
    pub flow: ConversationFlow,
    pub state: WorkingState,
}

// ============================================
// Watcher runtime state
// ============================================

/// Daemon liveness and counters, persisted as the PID/state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherRuntimeState {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub processed_count: u64,
    pub error_count: u64,
}

impl WatcherRuntimeState {
    pub fn for_current_process() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            processed_count: 0,
            error_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::from_label("Human"), Some(Role::User));
        assert_eq!(Role::from_label(" AI "), Some(Role::Assistant));
        assert_eq!(Role::from_label("system"), Some(Role::System));
        assert_eq!(Role::from_label("narrator"), None);
    }

    #[test]
    fn test_platform_parse_and_unknown_fallback() {
        assert_eq!("Augment".parse::<SourcePlatform>(), Ok(SourcePlatform::Augment));
        let parsed: SourcePlatform = serde_json::from_str("\"warp\"").unwrap();
        assert_eq!(parsed, SourcePlatform::Unknown);
    }

    #[test]
    fn test_digest_id_is_stable() {
        let a = Message::new("c1", Role::User, "hello", None);
        let b = Message::new("c1", Role::User, "hello", None);
        let c = Message::new("c1", Role::Assistant, "hello", None);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.starts_with("msg-"));
    }

    #[test]
    fn test_duplicate_ignores_id() {
        let a = Message::new("c1", Role::User, "same", None).with_id("x");
        let b = Message::new("c1", Role::User, "same", None).with_id("y");
        assert!(a.is_duplicate_of(&b));
    }

    #[test]
    fn test_checkpoint_deserializes_wire_shape() {
        let json = r#"{
            "conversation": {
                "id": "conv-1",
                "messages": [
                    {"id": "m1", "conversationId": "conv-1", "timestamp": "2025-01-02T03:04:05Z",
                     "role": "user", "content": "hi"}
                ],
                "createdAt": "2025-01-02T03:04:05Z",
                "updatedAt": "2025-01-02T03:04:05Z"
            },
            "timestamp": "2025-01-02T03:04:06Z",
            "source": "augment"
        }"#;
        let cp: Checkpoint = serde_json::from_str(json).unwrap();
        assert_eq!(cp.conversation.id, "conv-1");
        assert_eq!(cp.conversation.messages.len(), 1);
        assert_eq!(cp.source, SourcePlatform::Augment);
        assert!(cp.raw_data.is_none());
    }
}
