//! Input validation applied before the pipeline leaves `received`.
//! Prevents injection through identifiers and keeps payloads bounded.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

/// Maximum lengths for safety
pub const MAX_AGENT_ID_LENGTH: usize = 128;
pub const MAX_CONTENT_LENGTH: usize = 50_000; // 50KB
pub const MAX_CHANNEL_LENGTH: usize = 64;
pub const MAX_ENTITY_LENGTH: usize = 256; // Max entity name length
pub const MAX_METADATA_ENTRIES: usize = 64;
pub const MAX_METADATA_VALUE_LENGTH: usize = 4_096;
pub const MAX_ATTACHMENTS: usize = 16;
pub const MAX_ATTACHMENT_BYTES: usize = 200_000;
pub const MAX_LESSON_BODY_LENGTH: usize = 20_000;

/// Validate agent_id: alphanumeric plus `-`, `_`, `@`, `.`
pub fn validate_agent_id(agent_id: &str) -> Result<()> {
    if agent_id.is_empty() {
        return Err(anyhow!("agent_id cannot be empty"));
    }
    if agent_id.len() > MAX_AGENT_ID_LENGTH {
        return Err(anyhow!(
            "agent_id too long: {} chars (max: {})",
            agent_id.len(),
            MAX_AGENT_ID_LENGTH
        ));
    }
    if !agent_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.')
    {
        return Err(anyhow!(
            "agent_id contains invalid characters (allowed: alphanumeric, -, _, @, .)"
        ));
    }
    Ok(())
}

/// Validate the free-form channel tag
pub fn validate_channel(channel: &str) -> Result<()> {
    if channel.trim().is_empty() {
        return Err(anyhow!("channel cannot be empty"));
    }
    if channel.len() > MAX_CHANNEL_LENGTH {
        return Err(anyhow!(
            "channel too long: {} chars (max: {})",
            channel.len(),
            MAX_CHANNEL_LENGTH
        ));
    }
    if !channel
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "channel contains invalid characters (allowed: alphanumeric, -, _)"
        ));
    }
    Ok(())
}

/// Validate interaction text
pub fn validate_content(content: &str, allow_empty: bool) -> Result<()> {
    if !allow_empty && content.trim().is_empty() {
        return Err(anyhow!("text cannot be empty"));
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(anyhow!(
            "text too long: {} bytes (max: {})",
            content.len(),
            MAX_CONTENT_LENGTH
        ));
    }
    Ok(())
}

/// Validate the metadata map size
pub fn validate_metadata(metadata: &std::collections::HashMap<String, String>) -> Result<()> {
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(anyhow!(
            "too many metadata entries: {} (max: {})",
            metadata.len(),
            MAX_METADATA_ENTRIES
        ));
    }
    for (key, value) in metadata {
        if key.is_empty() || key.len() > MAX_ENTITY_LENGTH {
            return Err(anyhow!("metadata key length out of range: '{key}'"));
        }
        if value.len() > MAX_METADATA_VALUE_LENGTH {
            return Err(anyhow!(
                "metadata value for '{key}' too long: {} bytes (max: {})",
                value.len(),
                MAX_METADATA_VALUE_LENGTH
            ));
        }
    }
    Ok(())
}

/// Validate an entity name or type as supplied by a caller
pub fn validate_entity_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(anyhow!("entity token cannot be empty"));
    }
    if token.len() > MAX_ENTITY_LENGTH {
        return Err(anyhow!(
            "entity token too long: {} chars (max: {})",
            token.len(),
            MAX_ENTITY_LENGTH
        ));
    }
    Ok(())
}

/// Parse a calendar date in `YYYY-MM-DD` form
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow!("invalid date '{date}' (expected YYYY-MM-DD): {e}"))
}

/// Validate a memory_id (UUID format)
pub fn validate_memory_id(memory_id: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(memory_id).map_err(|e| anyhow!("invalid memory_id UUID format: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_rules() {
        assert!(validate_agent_id("agent-7@fleet.example").is_ok());
        assert!(validate_agent_id("").is_err());
        assert!(validate_agent_id("bad id with spaces").is_err());
        assert!(validate_agent_id(&"x".repeat(MAX_AGENT_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn channel_rules() {
        assert!(validate_channel("meeting").is_ok());
        assert!(validate_channel("e-mail_2").is_ok());
        assert!(validate_channel("").is_err());
        assert!(validate_channel("a b").is_err());
    }

    #[test]
    fn date_parsing() {
        assert!(parse_date("2026-08-29").is_ok());
        assert!(parse_date("29/08/2026").is_err());
        assert!(parse_date("2026-13-01").is_err());
    }

    #[test]
    fn content_bounds() {
        assert!(validate_content("hello", false).is_ok());
        assert!(validate_content("   ", false).is_err());
        assert!(validate_content("", true).is_ok());
    }
}
