//! Parsing the firmware header metadata.
//!
//! The receiver describes itself with a single element of attribute text, for
//! example:
//!
//! ```text
//! <FirmwareHeader SchemaVersion='1' ApiVersion='2.2.0.0' ProductId='G4Receiver'
//!     ProductName='Dexcom G4 Receiver' FirmwareVersion='2.0.1.104' />
//! ```
//!
//! Only the element tag and its single-quoted attributes are extracted.

use alloc::{
    borrow::ToOwned,
    collections::BTreeMap,
    string::{String, ToString},
};

use log::warn;

use super::record::DecodeError;

/// Metadata the receiver reports about its firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareHeader {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

impl FirmwareHeader {
    /// Parse metadata from its text form.
    ///
    /// An attribute given more than once keeps its last value.
    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        let start = s
            .find('<')
            .ok_or_else(|| DecodeError::Metadata("missing element".to_string()))?
            + 1;

        let tag_len = s[start..].bytes().take_while(u8::is_ascii_alphabetic).count();
        if tag_len == 0 {
            Err(DecodeError::Metadata("missing element tag".to_string()))?;
        }

        let tag = s[start..start + tag_len].to_owned();
        let mut attributes = BTreeMap::new();

        let mut rest = &s[start + tag_len..];
        while let Some(eq) = rest.find("='") {
            let head = &rest[..eq];
            let name_len = head.bytes().rev().take_while(u8::is_ascii_alphabetic).count();
            let name = &head[head.len() - name_len..];

            let tail = &rest[eq + 2..];
            let end = tail
                .find('\'')
                .ok_or_else(|| DecodeError::Metadata("unterminated attribute value".to_string()))?;
            let value = &tail[..end];

            rest = &tail[end + 1..];

            if name.is_empty() || value.is_empty() {
                continue;
            }

            if attributes.insert(name.to_owned(), value.to_owned()).is_some() {
                warn!("firmware header repeats attribute {name}");
            }
        }

        Ok(FirmwareHeader { tag, attributes })
    }

    /// Decode metadata from a response payload.
    pub fn decode(r: &[u8]) -> Result<Self, DecodeError> {
        let s = core::str::from_utf8(r)
            .map_err(|_| DecodeError::Metadata("text is not UTF-8".to_string()))?;

        Self::parse(s)
    }

    /// The value of an attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn product_name(&self) -> Option<&str> {
        self.attribute("ProductName")
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.attribute("FirmwareVersion")
    }
}
