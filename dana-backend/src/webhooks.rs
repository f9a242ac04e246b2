//! Meta webhook payload parsing and signature checks

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use sha2::Sha256;

use crate::models::Platform;

/// One inbound text message extracted from a webhook payload
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// page_id (Messenger / Instagram) or phone_number_id (WhatsApp) the message was sent to
    pub recipient_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub message_id: Option<String>,
    pub text: String,
}

/// Check an `X-Hub-Signature-256` (`sha256=<hex>`) or `X-Hub-Signature` (`sha1=<hex>`) header
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some((algo, hex_sig)) = header.trim().split_once('=') else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    match algo {
        "sha256" => match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        "sha1" => match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(body);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
pub fn sign_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Messenger / Instagram: `entry[].messaging[]` events with a text message
fn parse_messaging(payload: &Value) -> Vec<InboundMessage> {
    let mut out = Vec::new();
    let entries = payload.get("entry").and_then(Value::as_array).into_iter().flatten();

    for entry in entries {
        let page_id = entry.get("id").map(json_id);
        let events = entry.get("messaging").and_then(Value::as_array).into_iter().flatten();

        for event in events {
            // Echoes of our own outbound replies come back on the same webhook
            if event.pointer("/message/is_echo").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            let (Some(sender), Some(text)) = (str_at(event, "/sender/id"), str_at(event, "/message/text")) else {
                continue;
            };
            let recipient = str_at(event, "/recipient/id").map(str::to_string).or_else(|| page_id.clone());
            let Some(recipient_id) = recipient else {
                continue;
            };

            out.push(InboundMessage {
                recipient_id,
                sender_id: sender.to_string(),
                sender_name: None,
                message_id: str_at(event, "/message/mid").map(str::to_string),
                text: text.to_string(),
            });
        }
    }
    out
}

/// WhatsApp Cloud: `entry[].changes[].value.messages[]` of type text
fn parse_whatsapp(payload: &Value) -> Vec<InboundMessage> {
    let mut out = Vec::new();
    let entries = payload.get("entry").and_then(Value::as_array).into_iter().flatten();

    for entry in entries {
        let changes = entry.get("changes").and_then(Value::as_array).into_iter().flatten();
        for change in changes {
            let Some(value) = change.get("value") else { continue };
            let Some(phone_number_id) = str_at(value, "/metadata/phone_number_id") else {
                continue;
            };
            let contacts = value.get("contacts").and_then(Value::as_array);
            let messages = value.get("messages").and_then(Value::as_array).into_iter().flatten();

            for message in messages {
                let (Some(from), Some(text)) = (str_at(message, "/from"), str_at(message, "/text/body")) else {
                    continue;
                };
                let sender_name = contacts
                    .and_then(|list| list.iter().find(|c| str_at(c, "/wa_id") == Some(from)))
                    .and_then(|c| str_at(c, "/profile/name"))
                    .map(str::to_string);

                out.push(InboundMessage {
                    recipient_id: phone_number_id.to_string(),
                    sender_id: from.to_string(),
                    sender_name,
                    message_id: str_at(message, "/id").map(str::to_string),
                    text: text.to_string(),
                });
            }
        }
    }
    out
}

fn json_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract inbound text messages for a platform; non-text events are ignored
pub fn parse_inbound(platform: Platform, payload: &Value) -> Vec<InboundMessage> {
    match platform {
        Platform::Facebook | Platform::Instagram => parse_messaging(payload),
        Platform::Whatsapp => parse_whatsapp(payload),
        _ => Vec::new(),
    }
}

/// Platforms that deliver webhooks
pub fn webhook_platform(name: &str) -> Option<Platform> {
    match name.parse::<Platform>().ok()? {
        p @ (Platform::Facebook | Platform::Instagram | Platform::Whatsapp) => Some(p),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_roundtrip_and_tamper() {
        let body = br#"{"object":"page"}"#;
        let header = sign_sha256("app-secret", body);
        assert!(verify_signature("app-secret", body, &header));
        assert!(!verify_signature("other-secret", body, &header));
        assert!(!verify_signature("app-secret", b"{}", &header));
        assert!(!verify_signature("app-secret", body, "sha256=zz"));
        assert!(!verify_signature("app-secret", body, "md5=abcd"));
        assert!(!verify_signature("app-secret", body, "garbage"));
    }

    #[test]
    fn test_sha1_signature() {
        let body = b"payload";
        let mut mac = Hmac::<Sha1>::new_from_slice(b"s").unwrap();
        mac.update(body);
        let header = format!("sha1={}", hex::encode(mac.finalize().into_bytes()));
        assert!(verify_signature("s", body, &header));
    }

    #[test]
    fn test_parse_messenger() {
        let payload = json!({
            "object": "page",
            "entry": [{
                "id": "PAGE1",
                "messaging": [
                    {"sender": {"id": "U1"}, "recipient": {"id": "PAGE1"}, "message": {"mid": "m1", "text": "hello"}},
                    {"sender": {"id": "PAGE1"}, "recipient": {"id": "U1"}, "message": {"mid": "m2", "text": "echo", "is_echo": true}},
                    {"sender": {"id": "U2"}, "recipient": {"id": "PAGE1"}, "delivery": {"watermark": 1}}
                ]
            }]
        });
        let messages = parse_inbound(Platform::Facebook, &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient_id, "PAGE1");
        assert_eq!(messages[0].sender_id, "U1");
        assert_eq!(messages[0].message_id.as_deref(), Some("m1"));
        assert_eq!(messages[0].text, "hello");
    }

    #[test]
    fn test_parse_whatsapp() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"phone_number_id": "PN1"},
                        "contacts": [{"wa_id": "15550001", "profile": {"name": "Ana"}}],
                        "messages": [
                            {"from": "15550001", "id": "wamid.1", "type": "text", "text": {"body": "Where is my order?"}},
                            {"from": "15550001", "id": "wamid.2", "type": "image", "image": {"id": "x"}}
                        ]
                    }
                }]
            }]
        });
        let messages = parse_inbound(Platform::Whatsapp, &payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].recipient_id, "PN1");
        assert_eq!(messages[0].sender_name.as_deref(), Some("Ana"));
        assert_eq!(messages[0].text, "Where is my order?");
    }

    #[test]
    fn test_webhook_platform() {
        assert_eq!(webhook_platform("instagram"), Some(Platform::Instagram));
        assert_eq!(webhook_platform("slack"), None);
        assert_eq!(webhook_platform("myspace"), None);
    }
}
