//! Wire protocol for the call channel
//!
//! Every message is a JSON object with a `type` discriminator.
//!
//! Client → server:
//! - `store_user` — register the connection under a name; agents also go
//!   online+available in the directory
//! - `request_kyc_call` — member asks to be matched to an agent
//! - `create_offer` / `create_answer` / `ice_candidate` — WebRTC negotiation,
//!   forwarded verbatim to `target`
//! - `kyc_status_update` — operator records a case outcome
//! - `call_ended` — agent/admin ends the call
//!
//! Server → client:
//! - `waiting`, `incoming_call`, `agent_assigned`, `kyc_result`, `call_ended`
//!
//! Relay payloads may carry arbitrary extra fields (SDP blobs, candidate
//! records); only `target` is parsed here — the raw message text is what gets
//! forwarded, so nothing is lost or re-encoded.

use serde::{Deserialize, Serialize};

/// Who the participant is in the verification flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Caller requesting identity verification
    Member,
    /// Human operator conducting the verification call
    Agent,
}

/// Message received from a client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register this connection under a participant name
    StoreUser { name: String, role: Role },

    /// Member requests a live verification call
    RequestKycCall {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// WebRTC offer, relayed verbatim
    CreateOffer { target: String },

    /// WebRTC answer, relayed verbatim
    CreateAnswer { target: String },

    /// ICE candidate, relayed verbatim
    IceCandidate { target: String },

    /// Record a verification outcome against a member case
    KycStatusUpdate {
        status: String,
        #[serde(rename = "memberId")]
        member_id: i64,
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(rename = "userName")]
        user_name: String,
    },

    /// End the call; `name` is accepted as a legacy spelling of `agentName`
    CallEnded {
        #[serde(rename = "agentName", alias = "name")]
        agent_name: String,
        target: String,
    },
}

/// Message sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// No agent available; the request is queued
    Waiting,

    /// An agent is told a member is calling
    IncomingCall {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// A member is told which agent took the call
    AgentAssigned {
        #[serde(rename = "agentName")]
        agent_name: String,
    },

    /// Verification outcome pushed to the member
    KycResult { status: String },

    /// The call is over
    CallEnded,
}

impl ServerMessage {
    /// Serialize to the wire representation
    pub fn to_json(&self) -> String {
        // ServerMessage has no failing serializations (no maps, no non-string
        // keys), so this cannot panic in practice.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"waiting"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_user() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"store_user","name":"alice","role":"agent"}"#)
                .unwrap();
        match msg {
            ClientMessage::StoreUser { name, role } => {
                assert_eq!(name, "alice");
                assert_eq!(role, Role::Agent);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_relay_message_ignoring_payload_fields() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"create_offer","target":"bob","sdp":"v=0...","extra":{"a":1}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CreateOffer { target } => assert_eq!(target, "bob"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn call_ended_accepts_both_field_spellings() {
        let new_style: ClientMessage = serde_json::from_str(
            r#"{"type":"call_ended","agentName":"alice","target":"m-1"}"#,
        )
        .unwrap();
        let legacy: ClientMessage =
            serde_json::from_str(r#"{"type":"call_ended","name":"alice","target":"m-1"}"#)
                .unwrap();

        for msg in [new_style, legacy] {
            match msg {
                ClientMessage::CallEnded { agent_name, target } => {
                    assert_eq!(agent_name, "alice");
                    assert_eq!(target, "m-1");
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[test]
    fn rejects_message_missing_required_field() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"request_kyc_call"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"unknown_thing"}"#).is_err());
    }

    #[test]
    fn server_messages_serialize_with_wire_field_names() {
        let json = ServerMessage::AgentAssigned {
            agent_name: "alice".into(),
        }
        .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "agent_assigned");
        assert_eq!(value["agentName"], "alice");

        let json = ServerMessage::IncomingCall {
            user_id: "m-1".into(),
        }
        .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "incoming_call");
        assert_eq!(value["userId"], "m-1");

        let value: serde_json::Value =
            serde_json::from_str(&ServerMessage::Waiting.to_json()).unwrap();
        assert_eq!(value["type"], "waiting");
    }
}
