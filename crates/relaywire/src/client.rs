use crate::{Error, Event, Filter};
use serde_json::json;

/// Messages sent by clients, received by relays
#[derive(Debug)]
pub enum ClientMessage<'a> {
    Event(&'a Event),
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Close {
        sub_id: String,
    },
}

impl<'a> ClientMessage<'a> {
    pub fn event(event: &'a Event) -> Self {
        ClientMessage::Event(event)
    }

    pub fn req(sub_id: String, filters: Vec<Filter>) -> Self {
        ClientMessage::Req { sub_id, filters }
    }

    pub fn close(sub_id: String) -> Self {
        ClientMessage::Close { sub_id }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(match self {
            Self::Event(ev) => format!("[\"EVENT\",{}]", ev.json()?),
            Self::Req { sub_id, filters } => {
                if filters.is_empty() {
                    format!("[\"REQ\",\"{}\",{{}}]", sub_id)
                } else {
                    let filters_json: Result<Vec<String>, Error> =
                        filters.iter().map(|f| f.json()).collect();
                    format!("[\"REQ\",\"{}\",{}]", sub_id, filters_json?.join(","))
                }
            }
            Self::Close { sub_id } => json!(["CLOSE", sub_id]).to_string(),
        })
    }
}
