//! `track.loop_params` settings grammar: parses and serializes the
//! two-stage loop-filter coefficient spec, grounded on the teacher's own
//! `FromStr`/`Display` pattern for `IQFileType` in `recording.rs`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

const VALID_COHERENT_MS: [u32; 6] = [1, 2, 4, 5, 10, 20];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopParamsStage {
    pub coherent_ms: u32,
    pub code_bw: f64,
    pub code_zeta: f64,
    pub code_k: f64,
    pub carr_to_code: f64,
    pub carr_bw: f64,
    pub carr_zeta: f64,
    pub carr_k: f64,
    pub carr_fll_aid_gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopParams {
    pub stages: [LoopParamsStage; 2],
}

impl LoopParams {
    pub fn stage(&self, stage: usize) -> &LoopParamsStage {
        &self.stages[stage]
    }

    /// `track.loop_params` default value (spec §6).
    pub fn default_value() -> Self {
        Self::from_str(
            "(1 ms, (1, 0.7, 1, 1540), (10, 0.7, 1, 5)), (5 ms, (1, 0.7, 1, 1540), (50, 0.7, 1, 0))",
        )
        .expect("built-in default must parse")
    }
}

impl Default for LoopParams {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Splits on commas at paren-depth 0, so nested tuples stay intact.
fn split_top_level(s: &str) -> Vec<String> {
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                cur.push(c);
            }
            ')' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth == 0 => {
                parts.push(cur.trim().to_string());
                cur = String::new();
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() {
        parts.push(cur.trim().to_string());
    }
    parts
}

fn strip_parens(s: &str) -> Result<&str, TrackingError> {
    let s = s.trim();
    if !s.starts_with('(') || !s.ends_with(')') {
        return Err(TrackingError::InvalidLoopParams(format!(
            "expected parenthesized group, got `{s}`"
        )));
    }
    Ok(&s[1..s.len() - 1])
}

fn parse_f64_tuple4(s: &str) -> Result<[f64; 4], TrackingError> {
    let inner = strip_parens(s)?;
    let fields = split_top_level(inner);
    if fields.len() != 4 {
        return Err(TrackingError::InvalidLoopParams(format!(
            "expected 4 fields, got `{s}`"
        )));
    }
    let mut out = [0.0; 4];
    for (i, f) in fields.iter().enumerate() {
        out[i] = f.parse::<f64>().map_err(|_| {
            TrackingError::InvalidLoopParams(format!("not a number: `{f}`"))
        })?;
    }
    Ok(out)
}

fn parse_stage(s: &str) -> Result<LoopParamsStage, TrackingError> {
    let inner = strip_parens(s)?;
    let fields = split_top_level(inner);
    if fields.len() != 3 {
        return Err(TrackingError::InvalidLoopParams(format!(
            "expected `(ms, (code...), (carr...))`, got `{s}`"
        )));
    }

    let ms_tok = fields[0]
        .split_whitespace()
        .next()
        .ok_or_else(|| TrackingError::InvalidLoopParams("missing coherent_ms".into()))?;
    let coherent_ms: u32 = ms_tok
        .parse()
        .map_err(|_| TrackingError::InvalidLoopParams(format!("bad coherent_ms: `{ms_tok}`")))?;
    if !fields[0].trim_start_matches(ms_tok).trim().starts_with("ms") {
        return Err(TrackingError::InvalidLoopParams(format!(
            "expected `<n> ms`, got `{}`",
            fields[0]
        )));
    }
    if !VALID_COHERENT_MS.contains(&coherent_ms) {
        return Err(TrackingError::InvalidLoopParams(format!(
            "coherent_ms {coherent_ms} does not divide 20"
        )));
    }

    let code = parse_f64_tuple4(&fields[1])?;
    let carr = parse_f64_tuple4(&fields[2])?;

    Ok(LoopParamsStage {
        coherent_ms,
        code_bw: code[0],
        code_zeta: code[1],
        code_k: code[2],
        carr_to_code: code[3],
        carr_bw: carr[0],
        carr_zeta: carr[1],
        carr_k: carr[2],
        carr_fll_aid_gain: carr[3],
    })
}

impl FromStr for LoopParams {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stage_strs = split_top_level(s);
        if stage_strs.is_empty() || stage_strs.len() > 2 {
            return Err(TrackingError::InvalidLoopParams(format!(
                "expected one or two stages, got {}",
                stage_strs.len()
            )));
        }

        let stage0 = parse_stage(&stage_strs[0])?;
        if stage0.coherent_ms != 1 {
            return Err(TrackingError::InvalidLoopParams(format!(
                "stage 0 must be 1 ms, got {} ms",
                stage0.coherent_ms
            )));
        }
        let stage1 = if stage_strs.len() == 2 {
            parse_stage(&stage_strs[1])?
        } else {
            stage0
        };

        Ok(LoopParams {
            stages: [stage0, stage1],
        })
    }
}

impl fmt::Display for LoopParamsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} ms, ({}, {}, {}, {}), ({}, {}, {}, {}))",
            self.coherent_ms,
            self.code_bw,
            self.code_zeta,
            self.code_k,
            self.carr_to_code,
            self.carr_bw,
            self.carr_zeta,
            self.carr_k,
            self.carr_fll_aid_gain,
        )
    }
}

impl fmt::Display for LoopParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.stages[0], self.stages[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_stage_default() {
        let p = LoopParams::default_value();
        assert_eq!(p.stages[0].coherent_ms, 1);
        assert_eq!(p.stages[1].coherent_ms, 5);
        assert_eq!(p.stages[1].carr_bw, 50.0);
    }

    #[test]
    fn parses_single_stage_and_duplicates() {
        let p = LoopParams::from_str("(1 ms, (1, 0.7, 1, 1540), (10, 0.7, 1, 5))").unwrap();
        assert_eq!(p.stages[0], p.stages[1]);
    }

    #[test]
    fn rejects_non_1ms_stage0() {
        let res = LoopParams::from_str("(2 ms, (1, 0.7, 1, 1540), (10, 0.7, 1, 5))");
        assert!(res.is_err());
    }

    #[test]
    fn rejects_invalid_coherent_ms() {
        // stage 1 may be any valid coherent_ms, but 3 doesn't divide 20
        let res = LoopParams::from_str("(1 ms, (1, 0.7, 1, 1540), (10, 0.7, 1, 5)), (3 ms, (1, 0.7, 1, 1540), (50, 0.7, 1, 0))");
        assert!(res.is_err());
    }

    #[test]
    fn parse_of_serialize_round_trips() {
        let p = LoopParams::default_value();
        let s = p.to_string();
        let reparsed = LoopParams::from_str(&s).unwrap();
        assert_eq!(p, reparsed);
    }
}
