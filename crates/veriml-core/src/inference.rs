//! Pure post-proof derivations: prediction, accuracy, public inputs and the
//! proof bytes submitted to the registry.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;
use thiserror::Error;
use veriml_chain::U256;

/// Fixed-point factor for accuracy stored on-chain.
pub const ACCURACY_SCALE: f64 = 1_000_000.0;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("proof payload missing '{0}' field")]
    MissingField(&'static str),

    #[error("invalid field element {0}")]
    InvalidFieldElement(String),

    #[error("rescaled output {index} is not a number: {value}")]
    InvalidScore { index: usize, value: String },

    #[error("cannot encode proof: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Class scores from the witness and the argmax index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub scores: Vec<f64>,
    pub predicted_index: Option<usize>,
}

/// Read `pretty_elements.rescaled_outputs[0]` and take its argmax.
///
/// Scores may be numbers or numeric strings; ties resolve to the first index.
/// A witness without outputs gives an empty prediction, but any output that
/// is not a number is an error, since dropping it would shift every later
/// class index.
pub fn extract_prediction(witness: &Value) -> Result<Prediction, PayloadError> {
    let scores = match witness
        .pointer("/pretty_elements/rescaled_outputs/0")
        .and_then(Value::as_array)
    {
        Some(outputs) => outputs
            .iter()
            .enumerate()
            .map(|(index, value)| {
                score(value).ok_or_else(|| PayloadError::InvalidScore {
                    index,
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?,
        None => Vec::new(),
    };

    let predicted_index = scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &s)| match best {
            Some((_, b)) if s <= b => best,
            _ => Some((i, s)),
        })
        .map(|(i, _)| i);

    Ok(Prediction {
        scores,
        predicted_index,
    })
}

fn score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 1.0 on a match, 0.0 on a mismatch, unset when either index is unknown.
pub fn accuracy(predicted: Option<usize>, target: Option<usize>) -> Option<f64> {
    match (predicted, target) {
        (Some(p), Some(t)) => Some(if p == t { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Accuracy as an integer in millionths. Absent, non-finite or out-of-range
/// values count as zero.
pub fn scale_accuracy(accuracy: Option<f64>) -> u64 {
    match accuracy {
        Some(a) if a.is_finite() && (0.0..=1.0).contains(&a) => (a * ACCURACY_SCALE).round() as u64,
        _ => 0,
    }
}

/// Public inputs as decimal strings plus a display rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub list: Vec<String>,
    pub pretty: String,
}

/// Flatten every field element of every instance, in order.
pub fn format_public_inputs(proof: &Value) -> Result<PublicInputs, PayloadError> {
    let instances = proof
        .get("instances")
        .and_then(Value::as_array)
        .ok_or(PayloadError::MissingField("instances"))?;

    let mut list = Vec::new();
    for instance in instances {
        let felts = instance
            .as_array()
            .ok_or_else(|| PayloadError::InvalidFieldElement(instance.to_string()))?;
        for felt in felts {
            list.push(felt_to_u256(felt)?.to_string());
        }
    }

    let pretty = format!(
        "[{}]",
        list.iter()
            .map(|v| format!("\"{v}\""))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(PublicInputs { list, pretty })
}

/// A field element as serialised by the proving toolkit: a hex string of its
/// little-endian representation, or four little-endian u64 limbs.
pub fn felt_to_u256(felt: &Value) -> Result<U256, PayloadError> {
    let invalid = || PayloadError::InvalidFieldElement(felt.to_string());
    match felt {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            if digits.is_empty() || digits.len() > 64 {
                return Err(invalid());
            }
            let padded = if digits.len() % 2 == 1 {
                format!("0{digits}")
            } else {
                digits.to_string()
            };
            let bytes = hex::decode(padded).map_err(|_| invalid())?;
            Ok(U256::from_le_slice(&bytes))
        }
        Value::Array(limbs) if limbs.len() == 4 => {
            let mut value = U256::ZERO;
            for (i, limb) in limbs.iter().enumerate() {
                let limb = limb.as_u64().ok_or_else(invalid)?;
                value |= U256::from(limb) << (64 * i);
            }
            Ok(value)
        }
        _ => Err(invalid()),
    }
}

/// Proof bytes for registration: the `proof` field decoded as hex, or its
/// JSON text when it is not hex. The text uses `", "` and `": "` separators
/// and `\uXXXX` escapes for non-ASCII characters.
pub fn proof_bytes(proof: &Value) -> Result<Vec<u8>, PayloadError> {
    let field = match proof.get("proof") {
        None | Some(Value::Null) => return Err(PayloadError::MissingField("proof")),
        Some(field) => field,
    };
    if let Value::String(s) = field {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let padded = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        if let Ok(bytes) = hex::decode(padded) {
            return Ok(bytes);
        }
    }
    let mut text = Vec::new();
    field.serialize(&mut serde_json::Serializer::with_formatter(
        &mut text,
        SpacedAsciiFormatter,
    ))?;
    Ok(text)
}

/// JSON text with spaced separators and ASCII-only output.
struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn argmax_over_string_scores() {
        let witness = json!({"pretty_elements": {"rescaled_outputs": [["0.1", "0.7", "0.2"]]}});
        let p = extract_prediction(&witness).unwrap();
        assert_eq!(p.scores, vec![0.1, 0.7, 0.2]);
        assert_eq!(p.predicted_index, Some(1));
    }

    #[test]
    fn first_maximum_wins() {
        let witness = json!({"pretty_elements": {"rescaled_outputs": [[0.5, 0.5, 0.1]]}});
        assert_eq!(extract_prediction(&witness).unwrap().predicted_index, Some(0));
    }

    #[test]
    fn unparseable_score_is_an_error_not_a_shift() {
        let witness = json!({"pretty_elements": {"rescaled_outputs": [["0.1", null, "0.9"]]}});
        assert!(matches!(
            extract_prediction(&witness),
            Err(PayloadError::InvalidScore { index: 1, .. })
        ));

        let witness = json!({"pretty_elements": {"rescaled_outputs": [["0.1", "high", 0.9]]}});
        assert!(matches!(
            extract_prediction(&witness),
            Err(PayloadError::InvalidScore { index: 1, .. })
        ));
    }

    #[test]
    fn missing_outputs_give_empty_prediction() {
        let p = extract_prediction(&json!({})).unwrap();
        assert!(p.scores.is_empty());
        assert_eq!(p.predicted_index, None);
    }

    #[test]
    fn accuracy_against_target() {
        // labels {A, B} -> {A: 0, B: 1}; the sampled row is labelled B
        assert_eq!(accuracy(Some(1), Some(1)), Some(1.0));
        assert_eq!(accuracy(Some(0), Some(1)), Some(0.0));
        assert_eq!(accuracy(None, Some(1)), None);
        assert_eq!(accuracy(Some(1), None), None);
    }

    #[test]
    fn accuracy_scaling() {
        assert_eq!(scale_accuracy(Some(1.0)), 1_000_000);
        assert_eq!(scale_accuracy(Some(0.0)), 0);
        assert_eq!(scale_accuracy(Some(0.25)), 250_000);
        assert_eq!(scale_accuracy(None), 0);
        assert_eq!(scale_accuracy(Some(1.5)), 0);
        assert_eq!(scale_accuracy(Some(-0.1)), 0);
        assert_eq!(scale_accuracy(Some(f64::NAN)), 0);
    }

    #[test]
    fn field_element_decimal_round_trip() {
        let value: U256 = U256::from(0x1234_5678_9abc_def0_u64) << 100;
        let le_hex = hex::encode(value.to_le_bytes::<32>());

        let formatted = format_public_inputs(&json!({"instances": [[le_hex]]})).unwrap();
        let reparsed: U256 = formatted.list[0].parse().unwrap();
        assert_eq!(reparsed, value);
    }

    #[test]
    fn public_inputs_flatten_in_order() {
        let proof = json!({
            "instances": [
                ["0x0100000000000000000000000000000000000000000000000000000000000000", "02"],
                [[3, 0, 0, 0]]
            ]
        });
        let formatted = format_public_inputs(&proof).unwrap();
        assert_eq!(formatted.list, vec!["1", "2", "3"]);
        assert_eq!(formatted.pretty, r#"["1", "2", "3"]"#);
    }

    #[test]
    fn limbs_are_little_endian() {
        let value = felt_to_u256(&json!([0, 1, 0, 0])).unwrap();
        assert_eq!(value, U256::from(1u8) << 64);
    }

    #[test]
    fn bad_field_elements_are_rejected() {
        assert!(felt_to_u256(&json!("zz")).is_err());
        assert!(felt_to_u256(&json!(1.5)).is_err());
        assert!(felt_to_u256(&json!("0".repeat(66))).is_err());
        assert!(matches!(
            format_public_inputs(&json!({})),
            Err(PayloadError::MissingField("instances"))
        ));
    }

    #[test]
    fn proof_bytes_prefer_hex() {
        assert_eq!(
            proof_bytes(&json!({"proof": "0xdeadbeef"})).unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(proof_bytes(&json!({"proof": "abc"})).unwrap(), vec![0x0a, 0xbc]);
    }

    #[test]
    fn proof_bytes_fall_back_to_json_text() {
        assert_eq!(
            proof_bytes(&json!({"proof": [1, 2]})).unwrap(),
            b"[1, 2]".to_vec()
        );
        assert_eq!(
            proof_bytes(&json!({"proof": {"a": [1, {"b": "é"}], "c": null}})).unwrap(),
            br#"{"a": [1, {"b": "\u00e9"}], "c": null}"#.to_vec()
        );
        assert_eq!(
            proof_bytes(&json!({"proof": "not hex"})).unwrap(),
            b"\"not hex\"".to_vec()
        );
        assert!(matches!(
            proof_bytes(&json!({"instances": []})),
            Err(PayloadError::MissingField("proof"))
        ));
    }
}
