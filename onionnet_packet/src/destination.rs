/*! Response envelope of the destination server.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::wire::*;

/// Outcome of handling a payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// Payload was received and echoed.
    #[serde(rename = "OK")]
    Ok,
    /// Payload could not be handled.
    #[serde(rename = "ERROR")]
    Error,
}

/// How the received payload was turned into `echo`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoEncoding {
    /// Payload was base64 encoded JSON, `echo` is the decoded JSON.
    Base64Json,
    /// Payload was UTF-8 text but not JSON, `echo` is the text.
    Text,
    /// Payload was binary, `echo` is its base64 encoding.
    Base64,
}

/** Response of the destination.

Serialized form:

```json
{"result":"OK","echo":{"msg":"Hello, world!"},"length":24}
{"result":"ERROR","error":"Frame too big","length":0}
```

`encoding` is omitted when the payload was plain JSON. `echo` keeps the
exact text of the JSON it was built from, so numbers of any size and the
order of object keys survive the round trip.
*/
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinationResponse {
    /// Outcome.
    pub result: ResponseStatus,
    /// Echo of the received payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Box<RawValue>>,
    /// How the payload was interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EchoEncoding>,
    /// Length of the received payload in bytes.
    #[serde(default)]
    pub length: usize,
    /// Error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JsonWire for DestinationResponse {}

impl PartialEq for DestinationResponse {
    fn eq(&self, other: &Self) -> bool {
        self.result == other.result
            && self.echo.as_ref().map(|echo| echo.get()) == other.echo.as_ref().map(|echo| echo.get())
            && self.encoding == other.encoding
            && self.length == other.length
            && self.error == other.error
    }
}

impl DestinationResponse {
    /// Successful response echoing `echo`.
    pub fn echo(echo: Box<RawValue>, encoding: Option<EchoEncoding>, length: usize) -> DestinationResponse {
        DestinationResponse {
            result: ResponseStatus::Ok,
            echo: Some(echo),
            encoding,
            length,
            error: None,
        }
    }

    /// Error response.
    pub fn error<S: Into<String>>(error: S) -> DestinationResponse {
        DestinationResponse {
            result: ResponseStatus::Error,
            echo: None,
            encoding: None,
            length: 0,
            error: Some(error.into()),
        }
    }

    /// Echo parsed as a JSON value.
    pub fn echo_value(&self) -> Option<Value> {
        self.echo.as_ref().and_then(|echo| serde_json::from_str(echo.get()).ok())
    }

    /// Check if the payload was handled.
    pub fn is_ok(&self) -> bool {
        self.result == ResponseStatus::Ok
    }
}
