use crate::Error;
use ewebsock::{WsEvent, WsMessage};
use serde_json::Value;

/// Result of an `["OK", ...]` frame for a previously sent event.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandResult {
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Messages sent by relays, received by clients.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RelayMessage {
    Ok(CommandResult),
    Eose(String),
    Event { sub_id: String, event_json: String },
    Notice(String),
    Closed { sub_id: String, reason: String },
}

#[derive(Debug)]
pub enum RelayEvent {
    Opened,
    Closed,
    Other,
    Error(Error),
    Message(RelayMessage),
}

impl From<&WsEvent> for RelayEvent {
    fn from(event: &WsEvent) -> RelayEvent {
        match event {
            WsEvent::Opened => RelayEvent::Opened,
            WsEvent::Closed => RelayEvent::Closed,
            WsEvent::Message(ws_msg) => ws_msg.into(),
            WsEvent::Error(s) => RelayEvent::Error(Error::Websocket(s.to_owned())),
        }
    }
}

impl From<&WsMessage> for RelayEvent {
    fn from(wsmsg: &WsMessage) -> RelayEvent {
        match wsmsg {
            WsMessage::Text(s) => match RelayMessage::from_json(s) {
                Ok(msg) => RelayEvent::Message(msg),
                Err(err) => RelayEvent::Error(err),
            },
            _ => RelayEvent::Other,
        }
    }
}

fn str_at(arr: &[Value], idx: usize) -> Result<&str, Error> {
    arr.get(idx)
        .and_then(Value::as_str)
        .ok_or(Error::DecodeFailed)
}

impl RelayMessage {
    pub fn eose(sub_id: impl Into<String>) -> Self {
        RelayMessage::Eose(sub_id.into())
    }

    pub fn notice(msg: impl Into<String>) -> Self {
        RelayMessage::Notice(msg.into())
    }

    pub fn ok(event_id: impl Into<String>, accepted: bool, message: impl Into<String>) -> Self {
        RelayMessage::Ok(CommandResult {
            event_id: event_id.into(),
            accepted,
            message: message.into(),
        })
    }

    pub fn event(sub_id: impl Into<String>, event_json: impl Into<String>) -> Self {
        RelayMessage::Event {
            sub_id: sub_id.into(),
            event_json: event_json.into(),
        }
    }

    pub fn closed(sub_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayMessage::Closed {
            sub_id: sub_id.into(),
            reason: reason.into(),
        }
    }

    pub fn from_json(msg: &str) -> Result<RelayMessage, Error> {
        if msg.is_empty() {
            return Err(Error::Empty);
        }

        let value: Value = serde_json::from_str(msg)?;
        let arr = value.as_array().ok_or(Error::DecodeFailed)?;

        match str_at(arr, 0)? {
            // ["EVENT", <subscription id>, <event JSON>]
            "EVENT" => {
                let sub_id = str_at(arr, 1)?;
                let event = arr.get(2).ok_or(Error::DecodeFailed)?;
                if !event.is_object() {
                    return Err(Error::DecodeFailed);
                }
                Ok(Self::event(sub_id, event.to_string()))
            }

            // ["EOSE", <subscription id>]
            "EOSE" => Ok(Self::eose(str_at(arr, 1)?)),

            // ["OK", <event id>, <true|false>, <message>]
            "OK" => {
                let event_id = str_at(arr, 1)?;
                let accepted = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(Error::DecodeFailed)?;
                let message = str_at(arr, 3).unwrap_or("");
                Ok(Self::ok(event_id, accepted, message))
            }

            // ["NOTICE", <message>]
            "NOTICE" => Ok(Self::notice(str_at(arr, 1)?)),

            // ["CLOSED", <subscription id>, <reason>]
            "CLOSED" => {
                let sub_id = str_at(arr, 1)?;
                let reason = str_at(arr, 2).unwrap_or("");
                Ok(Self::closed(sub_id, reason))
            }

            _ => Err(Error::DecodeFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_valid_notice() -> Result<(), Error> {
        let valid_notice_msg = r#"["NOTICE","Invalid event format!"]"#;
        assert_eq!(
            RelayMessage::from_json(valid_notice_msg)?,
            RelayMessage::notice("Invalid event format!")
        );
        Ok(())
    }

    #[test]
    fn handle_invalid_notice() {
        assert!(matches!(
            RelayMessage::from_json(r#"["NOTICE"]"#).unwrap_err(),
            Error::DecodeFailed
        ));
        assert!(RelayMessage::from_json(r#"["NOTICE": 404]"#).is_err());
    }

    #[test]
    fn handle_valid_eose() -> Result<(), Error> {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","random-subscription-id"]"#)?,
            RelayMessage::eose("random-subscription-id")
        );
        Ok(())
    }

    #[test]
    fn handle_valid_ok() -> Result<(), Error> {
        let msg = r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",true,"pow: difficulty 25>=24"]"#;
        assert_eq!(
            RelayMessage::from_json(msg)?,
            RelayMessage::ok(
                "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",
                true,
                "pow: difficulty 25>=24"
            )
        );
        Ok(())
    }

    #[test]
    fn handle_ok_without_message() -> Result<(), Error> {
        let msg = r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",false]"#;
        let parsed = RelayMessage::from_json(msg)?;
        assert_eq!(
            parsed,
            RelayMessage::ok(
                "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",
                false,
                ""
            )
        );
        Ok(())
    }

    #[test]
    fn handle_invalid_ok() {
        // missing status
        assert!(RelayMessage::from_json(
            r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30"]"#
        )
        .is_err());

        // status not a bool
        assert!(RelayMessage::from_json(
            r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30","yes",""]"#
        )
        .is_err());
    }

    #[test]
    fn handle_closed_with_reason() -> Result<(), Error> {
        let msg = r#"["CLOSED","sub1","auth-required: we only serve authenticated users"]"#;
        assert_eq!(
            RelayMessage::from_json(msg)?,
            RelayMessage::closed("sub1", "auth-required: we only serve authenticated users")
        );
        Ok(())
    }

    #[test]
    fn handle_event() -> Result<(), Error> {
        let msg = r#"["EVENT","sub1",{"id":"aa","kind":1}]"#;
        match RelayMessage::from_json(msg)? {
            RelayMessage::Event { sub_id, event_json } => {
                assert_eq!(sub_id, "sub1");
                let val: serde_json::Value = serde_json::from_str(&event_json).unwrap();
                assert_eq!(val["kind"], 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn handle_unknown_frame() {
        assert!(RelayMessage::from_json(r#"["AUTH","challenge"]"#).is_err());
        assert!(matches!(
            RelayMessage::from_json("").unwrap_err(),
            Error::Empty
        ));
    }
}
