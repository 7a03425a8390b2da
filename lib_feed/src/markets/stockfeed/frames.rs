//! # Stock Feed Frames
//!
//! JSON wire frames exchanged with the stock streaming endpoint. Every frame is
//! an object carrying a `type` discriminator; outbound frames are serialized
//! straight from [`OutboundFrame`], inbound frames are decoded in two steps so
//! that a missing discriminator, an unknown kind and a malformed payload can be
//! told apart.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::FeedError;

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundFrame {
    Subscribe {
        #[serde(rename = "stockCodes")]
        stock_codes: Vec<String>,
    },
    Unsubscribe {
        #[serde(rename = "stockCodes")]
        stock_codes: Vec<String>,
    },
    Ping,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(|e| FeedError::Encode(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Subscribe { .. } => "SUBSCRIBE",
            OutboundFrame::Unsubscribe { .. } => "UNSUBSCRIBE",
            OutboundFrame::Ping => "PING",
        }
    }
}

/// Frames the server sends, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    ConnectionEstablished {
        message: Option<String>,
        timestamp: Option<Value>,
    },
    Subscribed(Vec<String>),
    Unsubscribed(Vec<String>),
    StockUpdate(StockQuote),
    Pong,
    Error(String),
    /// A well-formed frame of a kind this client does not handle.
    Unknown(String),
}

impl InboundFrame {
    /// Decodes one text frame.
    ///
    /// # Errors
    /// `FeedError::Decode` when the text is not a JSON object, has no string
    /// `type`, or the payload of a known kind does not match its schema.
    pub fn decode(text: &str) -> Result<Self, FeedError> {
        let value: Value = serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(FeedError::Decode("frame is not a JSON object".to_string()));
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(FeedError::Decode("`type` is not a string".to_string())),
            None => return Err(FeedError::Decode("missing `type`".to_string())),
        };

        let frame = match kind.as_str() {
            "CONNECTION_ESTABLISHED" => InboundFrame::ConnectionEstablished {
                message: object.remove("message").map(value_to_text),
                timestamp: object.remove("timestamp"),
            },
            "SUBSCRIBED" => InboundFrame::Subscribed(payload::<CodesEnvelope>(object)?.data.stock_codes),
            "UNSUBSCRIBED" => InboundFrame::Unsubscribed(payload::<CodesEnvelope>(object)?.data.stock_codes),
            "STOCK_UPDATE" => {
                let quote = payload::<QuoteEnvelope>(object)?.data.stock_data;
                if quote.stock_code.trim().is_empty() {
                    return Err(FeedError::Decode("STOCK_UPDATE without stockCode".to_string()));
                }
                InboundFrame::StockUpdate(quote)
            }
            "PONG" => InboundFrame::Pong,
            "ERROR" => InboundFrame::Error(
                object
                    .remove("message")
                    .map(value_to_text)
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            ),
            _ => InboundFrame::Unknown(kind),
        };

        Ok(frame)
    }

    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::ConnectionEstablished { .. } => "CONNECTION_ESTABLISHED",
            InboundFrame::Subscribed(_) => "SUBSCRIBED",
            InboundFrame::Unsubscribed(_) => "UNSUBSCRIBED",
            InboundFrame::StockUpdate(_) => "STOCK_UPDATE",
            InboundFrame::Pong => "PONG",
            InboundFrame::Error(_) => "ERROR",
            InboundFrame::Unknown(kind) => kind,
        }
    }
}

/// The latest quote for one stock code, as carried by `STOCK_UPDATE`.
///
/// Fields the client does not interpret are kept in `extra` so downstream
/// consumers still see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    pub stock_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_name: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub current_price: f64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub change_price: f64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub change_rate: f64,
    #[serde(default, deserialize_with = "optional_volume", skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StockQuote {
    /// Field-level equality on the values that drive a re-render: price,
    /// change and rate. Volume and extra fields do not count.
    pub fn same_price_point(&self, other: &StockQuote) -> bool {
        self.current_price == other.current_price
            && self.change_price == other.change_price
            && self.change_rate == other.change_rate
    }
}

#[derive(Deserialize)]
struct CodesEnvelope {
    data: CodesData,
}

#[derive(Deserialize)]
struct CodesData {
    #[serde(rename = "stockCodes", default)]
    stock_codes: Vec<String>,
}

#[derive(Deserialize)]
struct QuoteEnvelope {
    data: QuoteData,
}

#[derive(Deserialize)]
struct QuoteData {
    #[serde(rename = "stockData")]
    stock_data: StockQuote,
}

fn payload<T: de::DeserializeOwned>(object: Map<String, Value>) -> Result<T, FeedError> {
    serde_json::from_value(Value::Object(object)).map_err(|e| FeedError::Decode(e.to_string()))
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(text) => text
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("`{text}` is not a number"))),
    }
}

fn optional_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) if n >= 0.0 => Ok(Some(n as u64)),
        Some(NumberOrString::Number(n)) => Err(de::Error::custom(format!("negative volume {n}"))),
        Some(NumberOrString::Text(text)) => text
            .trim()
            .replace(',', "")
            .parse::<u64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("`{text}` is not a volume"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_frames_match_wire_format() {
        let subscribe = OutboundFrame::Subscribe { stock_codes: vec!["005930".into(), "035420".into()] };
        assert_eq!(subscribe.encode().unwrap(), r#"{"type":"SUBSCRIBE","stockCodes":["005930","035420"]}"#);

        let unsubscribe = OutboundFrame::Unsubscribe { stock_codes: vec!["005930".into()] };
        assert_eq!(unsubscribe.encode().unwrap(), r#"{"type":"UNSUBSCRIBE","stockCodes":["005930"]}"#);

        assert_eq!(OutboundFrame::Ping.encode().unwrap(), r#"{"type":"PING"}"#);
    }

    #[test]
    fn decodes_stock_update_with_extra_fields() {
        let text = json!({
            "type": "STOCK_UPDATE",
            "data": {"stockData": {
                "stockCode": "005930",
                "stockName": "Samsung Electronics",
                "currentPrice": 71500,
                "changePrice": -500,
                "changeRate": -0.69,
                "volume": 1234567,
                "highPrice": 72000
            }}
        })
        .to_string();

        let InboundFrame::StockUpdate(quote) = InboundFrame::decode(&text).unwrap() else {
            panic!("expected a stock update");
        };
        assert_eq!(quote.stock_code, "005930");
        assert_eq!(quote.current_price, 71500.0);
        assert_eq!(quote.change_price, -500.0);
        assert_eq!(quote.volume, Some(1_234_567));
        assert_eq!(quote.extra.get("highPrice"), Some(&json!(72000)));
    }

    #[test]
    fn accepts_numeric_strings() {
        let text = r#"{"type":"STOCK_UPDATE","data":{"stockData":{"stockCode":"035420","currentPrice":"182,000","changePrice":"1500","changeRate":"0.83","volume":"98,100"}}}"#;
        let InboundFrame::StockUpdate(quote) = InboundFrame::decode(text).unwrap() else {
            panic!("expected a stock update");
        };
        assert_eq!(quote.current_price, 182_000.0);
        assert_eq!(quote.change_rate, 0.83);
        assert_eq!(quote.volume, Some(98_100));
    }

    #[test]
    fn decodes_control_frames() {
        assert_eq!(
            InboundFrame::decode(r#"{"type":"SUBSCRIBED","data":{"stockCodes":["A","B"]}}"#).unwrap(),
            InboundFrame::Subscribed(vec!["A".into(), "B".into()])
        );
        assert_eq!(
            InboundFrame::decode(r#"{"type":"UNSUBSCRIBED","data":{"stockCodes":["A"]}}"#).unwrap(),
            InboundFrame::Unsubscribed(vec!["A".into()])
        );
        assert_eq!(InboundFrame::decode(r#"{"type":"PONG","timestamp":1}"#).unwrap(), InboundFrame::Pong);
        assert_eq!(
            InboundFrame::decode(r#"{"type":"ERROR","message":"invalid stock code"}"#).unwrap(),
            InboundFrame::Error("invalid stock code".into())
        );

        let established = InboundFrame::decode(r#"{"type":"CONNECTION_ESTABLISHED","message":"welcome","timestamp":"2024-01-02T09:00:00"}"#).unwrap();
        assert_eq!(established.kind(), "CONNECTION_ESTABLISHED");
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let frame = InboundFrame::decode(r#"{"type":"MARKET_NOTICE","data":{}}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown("MARKET_NOTICE".into()));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(InboundFrame::decode("not json at all"), Err(FeedError::Decode(_))));
        assert!(matches!(InboundFrame::decode("[1,2,3]"), Err(FeedError::Decode(_))));
        assert!(matches!(InboundFrame::decode(r#"{"data":{}}"#), Err(FeedError::Decode(_))));
        assert!(matches!(InboundFrame::decode(r#"{"type":7}"#), Err(FeedError::Decode(_))));
        assert!(matches!(InboundFrame::decode(r#"{"type":"SUBSCRIBED"}"#), Err(FeedError::Decode(_))));
        assert!(matches!(
            InboundFrame::decode(r#"{"type":"STOCK_UPDATE","data":{"stockData":{"stockCode":"","currentPrice":1}}}"#),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn price_point_ignores_volume() {
        let a: StockQuote = serde_json::from_value(json!({
            "stockCode": "005930", "currentPrice": 100, "changePrice": 1, "changeRate": 1.0, "volume": 10
        }))
        .unwrap();
        let mut b = a.clone();
        b.volume = Some(20);
        assert!(a.same_price_point(&b));
        b.change_rate = 1.1;
        assert!(!a.same_price_point(&b));
    }
}
