use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identifier naming one agent's region on the stage.
///
/// The wire carries either a string or a number. Both render to the same
/// textual form used to build element ids, so `3`, `3.0` and `"3"` address
/// the same agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u32> for AgentId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAgentId {
    Text(String),
    Number(serde_json::Number),
}

/// Render a JSON number the way a page would concatenate it into a selector.
fn number_to_id(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawAgentId::deserialize(deserializer)? {
            RawAgentId::Text(s) => Ok(Self(s)),
            RawAgentId::Number(n) => Ok(Self(number_to_id(&n))),
        }
    }
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Integers go back out as numbers so round trips keep the wire shape.
        match self.0.parse::<i64>() {
            Ok(n) if n.to_string() == self.0 => serializer.serialize_i64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

/// Requested visibility of an agent container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

impl Visibility {
    /// Target opacity for this visibility.
    pub fn opacity(self) -> f32 {
        match self {
            Self::Hidden => 0.0,
            Self::Visible => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_from_number() {
        let id: AgentId = serde_json::from_str("3").unwrap();
        assert_eq!(id.as_str(), "3");

        let id: AgentId = serde_json::from_str("3.0").unwrap();
        assert_eq!(id.as_str(), "3");

        let id: AgentId = serde_json::from_str("2.5").unwrap();
        assert_eq!(id.as_str(), "2.5");
    }

    #[test]
    fn test_agent_id_from_string() {
        let id: AgentId = serde_json::from_str(r#""narrator""#).unwrap();
        assert_eq!(id, AgentId::from("narrator"));
        assert_eq!(id.to_string(), "narrator");
    }

    #[test]
    fn test_agent_id_rejects_other_shapes() {
        assert!(serde_json::from_str::<AgentId>("null").is_err());
        assert!(serde_json::from_str::<AgentId>("[1]").is_err());
    }

    #[test]
    fn test_agent_id_serialize() {
        assert_eq!(serde_json::to_string(&AgentId::from(7u32)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&AgentId::from("a")).unwrap(), r#""a""#);
        assert_eq!(serde_json::to_string(&AgentId::from("007")).unwrap(), r#""007""#);
    }

    #[test]
    fn test_visibility_opacity() {
        assert_eq!(Visibility::default(), Visibility::Hidden);
        assert_eq!(Visibility::Hidden.opacity(), 0.0);
        assert_eq!(Visibility::Visible.opacity(), 1.0);
    }
}
