//! Params and results of the calls exchanged with the host.

use serde::{Deserialize, Serialize};

use crate::value::HostValue;

/// Byte fields travel base64-encoded inside the JSON envelope.
pub mod b64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(D::Error::custom)
    }
}

// ── served to the host ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitParams {
    /// Port of the host's callback server on 127.0.0.1.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCreateParams {
    pub name: String,
    #[serde(with = "b64")]
    pub config: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnMessageParams {
    pub guid: String,
    #[serde(with = "b64")]
    pub in_message: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnMessageResult {
    #[serde(with = "b64")]
    pub out_message: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCloseParams {
    pub guid: String,
}

// ── called on the host ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRef {
    pub scope: String,
    pub name: String,
    #[serde(with = "b64", default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVariableParams {
    pub variable: VariableRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVariableResult {
    #[serde(default)]
    pub value: HostValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetVariableParams {
    pub variable: VariableRef,
    pub value: HostValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRobotInfoResult {
    #[serde(default)]
    pub robot: HostValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVaultItemParams {
    pub vault_id: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVaultItemParams {
    pub vault_id: String,
    pub item_id: String,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultItemResult {
    #[serde(default)]
    pub item: HostValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugParams {
    pub guid: String,
    pub name: String,
    #[serde(with = "b64")]
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitOutputParams {
    pub guid: String,
    #[serde(with = "b64")]
    pub output: Vec<u8>,
    pub port: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitInputParams {
    pub guid: String,
    #[serde(with = "b64")]
    pub input: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitErrorParams {
    pub guid: String,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitFlowEventParams {
    pub guid: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bytes_are_base64_on_the_wire() {
        let p = OnMessageParams {
            guid: "n1".into(),
            in_message: b"{}".to_vec(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"guid": "n1", "inMessage": "e30="}));

        let back: OnMessageParams = serde_json::from_value(v).unwrap();
        assert_eq!(back.in_message, b"{}".to_vec());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let res = serde_json::from_value::<OnCreateParams>(json!({"name": "x", "config": "%%%"}));
        assert!(res.is_err());
    }

    #[test]
    fn empty_payload_is_omitted() {
        let v = VariableRef {
            scope: "Global".into(),
            name: "x".into(),
            payload: vec![],
        };
        assert_eq!(serde_json::to_value(&v).unwrap(), json!({"scope": "Global", "name": "x"}));
    }
}
