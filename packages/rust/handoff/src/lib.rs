//! Stage handoff store — durable named slots between pipeline stages.
//!
//! Each pipeline run owns a directory of named slot files under
//! `<root>/<run_id>/`. A stage writes its output slot before returning, so a
//! crash between stages is recoverable by re-reading the store, and every
//! intermediate artifact stays independently inspectable. Slots have
//! overwrite semantics: at most the latest value, no versioning.
//!
//! Reads tolerate legacy encodings: incident text in the wild arrives in
//! UTF-8, cp932/Shift_JIS (Japanese Windows exports), or Latin-1. JSON slots
//! are parsed from raw bytes first, then from each decoded text form. A read
//! that exhausts every encoding surfaces `ArtifactRead` carrying the slot
//! identity — callers must report it, never drop it silently.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use incidentscout_shared::{IncidentScoutError, Result, RunId};

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// The named handoff slots the pipeline exchanges artifacts through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Raw text of the user's query.
    OriginalQuery,
    /// JSON form of the generated [`StructuredQuery`](incidentscout_shared::StructuredQuery).
    GeneratedQuery,
    /// JSON array of matched incident records; always an array, never null.
    StructuredResults,
    /// JSON [`KnowledgeResult`](incidentscout_shared::KnowledgeResult); present
    /// (possibly empty) only when the fallback branch ran.
    KnowledgeResults,
}

impl Slot {
    /// Logical key, also used in error messages and report notes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OriginalQuery => "original_query",
            Self::GeneratedQuery => "generated_query",
            Self::StructuredResults => "structured_results",
            Self::KnowledgeResults => "knowledge_results",
        }
    }

    /// File name backing the slot.
    fn file_name(&self) -> &'static str {
        match self {
            Self::OriginalQuery => "original_query.txt",
            Self::GeneratedQuery => "generated_query.json",
            Self::StructuredResults => "structured_results.json",
            Self::KnowledgeResults => "knowledge_results.json",
        }
    }
}

// ---------------------------------------------------------------------------
// HandoffStore
// ---------------------------------------------------------------------------

/// Per-run keyed slot storage backed by files.
pub struct HandoffStore {
    run_dir: PathBuf,
}

impl HandoffStore {
    /// Create the slot directory for `run_id` under `root`.
    ///
    /// Each run gets its own namespace; concurrent runs never share slots.
    pub fn create(root: &Path, run_id: &RunId) -> Result<Self> {
        let run_dir = root.join(run_id.to_string());
        std::fs::create_dir_all(&run_dir).map_err(|e| IncidentScoutError::io(&run_dir, e))?;
        Ok(Self { run_dir })
    }

    /// Open an existing run directory without creating it (crash recovery).
    pub fn open(root: &Path, run_id: &RunId) -> Result<Self> {
        let run_dir = root.join(run_id.to_string());
        if !run_dir.is_dir() {
            return Err(IncidentScoutError::validation(format!(
                "no handoff namespace at {}",
                run_dir.display()
            )));
        }
        Ok(Self { run_dir })
    }

    /// Absolute path of a slot file.
    pub fn slot_path(&self, slot: Slot) -> PathBuf {
        self.run_dir.join(slot.file_name())
    }

    /// Whether a slot has been written.
    pub fn exists(&self, slot: Slot) -> bool {
        self.slot_path(slot).exists()
    }

    // -----------------------------------------------------------------------
    // Writes (always UTF-8, overwrite)
    // -----------------------------------------------------------------------

    /// Write raw text into a slot, replacing any previous value.
    pub fn write_text(&self, slot: Slot, content: &str) -> Result<()> {
        let path = self.slot_path(slot);
        std::fs::write(&path, content).map_err(|e| IncidentScoutError::io(&path, e))?;
        tracing::debug!(slot = slot.name(), bytes = content.len(), "slot written");
        Ok(())
    }

    /// Serialize a value as pretty JSON into a slot.
    pub fn write_json<T: Serialize>(&self, slot: Slot, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| IncidentScoutError::validation(format!("serialize {}: {e}", slot.name())))?;
        self.write_text(slot, &json)
    }

    // -----------------------------------------------------------------------
    // Reads (encoding fallback discipline)
    // -----------------------------------------------------------------------

    /// Read a slot as text, trying UTF-8, then Shift_JIS (covers cp932), then
    /// Latin-1, then a lossy raw-byte rendering as the last resort.
    pub fn read_text(&self, slot: Slot) -> Result<String> {
        let bytes = self.read_bytes(slot)?;
        Ok(decode_with_fallback(&bytes))
    }

    /// Read and parse a JSON slot.
    ///
    /// Raw bytes are parsed first (valid JSON is always UTF-8 at the byte
    /// level, and this catches BOM-free content directly); only then does
    /// parsing fall back to each decoded text form in turn. Exhausting every
    /// form yields `ArtifactRead` for this slot.
    pub fn read_json<T: DeserializeOwned>(&self, slot: Slot) -> Result<T> {
        let bytes = self.read_bytes(slot)?;

        if let Ok(value) = serde_json::from_slice::<T>(&bytes) {
            return Ok(value);
        }

        let mut last_error = String::from("raw-byte parse failed");
        for encoding in [encoding_rs::UTF_8, encoding_rs::SHIFT_JIS, encoding_rs::WINDOWS_1252] {
            let (text, _, had_errors) = encoding.decode(&bytes);
            if had_errors {
                continue;
            }
            match serde_json::from_str::<T>(&text) {
                Ok(value) => {
                    tracing::warn!(
                        slot = slot.name(),
                        encoding = encoding.name(),
                        "JSON slot required legacy-encoding fallback"
                    );
                    return Ok(value);
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(IncidentScoutError::artifact_read(slot.name(), last_error))
    }

    fn read_bytes(&self, slot: Slot) -> Result<Vec<u8>> {
        let path = self.slot_path(slot);
        std::fs::read(&path)
            .map_err(|e| IncidentScoutError::artifact_read(slot.name(), e.to_string()))
    }
}

/// Decode text bytes through the fallback chain.
///
/// UTF-8 is tried strictly first; Shift_JIS and Latin-1 follow. Latin-1
/// accepts any byte sequence, so plain-text reads always produce something;
/// the lossy rendering is the terminal step of the chain.
fn decode_with_fallback(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    for encoding in [encoding_rs::SHIFT_JIS, encoding_rs::WINDOWS_1252] {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}
