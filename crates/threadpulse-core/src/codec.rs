//! Command response serialization.
//!
//! A broadcast tick serializes its response once and hands the same bytes
//! to every attached observer. The serializer may report that there is
//! nothing to send (`Ok(None)`), in which case the tick is skipped.

use threadpulse_types::ActiveThreadCountResponse;

use crate::error::CodecError;

/// Serializes command responses into wire payloads.
pub trait CommandSerializer: Send + Sync {
    /// Encode `response`. `Ok(None)` means there is no payload to deliver.
    fn serialize(&self, response: &ActiveThreadCountResponse) -> Result<Option<Vec<u8>>, CodecError>;
}

/// JSON serializer using the response's camelCase field names.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCommandSerializer;

impl CommandSerializer for JsonCommandSerializer {
    fn serialize(&self, response: &ActiveThreadCountResponse) -> Result<Option<Vec<u8>>, CodecError> {
        Ok(Some(serde_json::to_vec(response)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_decodes_back_to_the_response() {
        let response = ActiveThreadCountResponse {
            histogram_schema_type: 1,
            active_thread_count: vec![4, 0, 2, 1],
            time_stamp: 1_700_000_000_123,
        };
        let payload = JsonCommandSerializer.serialize(&response).unwrap().unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"activeThreadCount\":[4,0,2,1]"));

        let decoded: ActiveThreadCountResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, response);
    }
}
