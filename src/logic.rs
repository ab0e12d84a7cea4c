//! Boolean expressions over named sensor states.
//!
//! Grammar (case-insensitive, evaluated in this order):
//!
//! | Form            | Meaning                                      |
//! |-----------------|----------------------------------------------|
//! | *(empty)*       | any sensor active                            |
//! | `(` … `)`       | first `(` to last `)` evaluated and replaced |
//! | `a and b`       | split at the first ` and `                   |
//! | `a or b`        | split at the first ` or `                    |
//! | `!a`            | negation of a single operand                 |
//! | `true`, `false` | literals                                     |
//! | `<id>`          | state of the sensor with that id             |
//!
//! Because ` and ` is split before ` or `, `a or b and c` reads as
//! `(a or b) and c`. Parentheses span from the first `(` to the last `)`,
//! so two disjoint groups such as `(a) or (b)` collapse into one span.

use log::{debug, error};

/// Read access to sensor states for the evaluator.
pub trait SensorLookup {
    /// State of the sensor whose id equals `id` (already lower-cased).
    fn state_of(&self, id: &str) -> Option<bool>;

    /// True if any known sensor is currently active.
    fn any_active(&self) -> bool;
}

impl SensorLookup for [(&str, bool)] {
    fn state_of(&self, id: &str) -> Option<bool> {
        self.iter()
            .find(|(name, _)| name.to_lowercase() == id)
            .map(|(_, state)| *state)
    }

    fn any_active(&self) -> bool {
        self.iter().any(|(_, state)| *state)
    }
}

/// Deepest nesting the evaluator follows. Parenthesis pairs, operator
/// splits and negations each count one level.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Evaluate `expression` against `sensors`.
///
/// Unknown sensor ids evaluate to `false`. A negation whose operand still
/// contains a binary operator is a configuration error and evaluates to
/// `false`, as does an expression nested deeper than
/// [`MAX_EXPRESSION_DEPTH`].
pub fn evaluate_logic_expression<L>(expression: &str, sensors: &L) -> bool
where
    L: SensorLookup + ?Sized,
{
    evaluate_at(expression, sensors, 0).unwrap_or_else(|| {
        error!(
            "Logic: expression nested deeper than {} levels",
            MAX_EXPRESSION_DEPTH
        );
        false
    })
}

/// `None` once the depth limit is hit; it propagates to the top.
fn evaluate_at<L>(expression: &str, sensors: &L, depth: usize) -> Option<bool>
where
    L: SensorLookup + ?Sized,
{
    if depth > MAX_EXPRESSION_DEPTH {
        return None;
    }
    if expression.is_empty() {
        return Some(sensors.any_active());
    }

    let expr = expression.trim().to_lowercase();
    let next = depth + 1;

    if let (Some(open), Some(close)) = (expr.find('('), expr.rfind(')')) {
        if close > open {
            let inner = evaluate_at(&expr[open + 1..close], sensors, next)?;
            let rewritten = format!(
                "{}{}{}",
                &expr[..open],
                if inner { "true" } else { "false" },
                &expr[close + 1..]
            );
            return evaluate_at(&rewritten, sensors, next);
        }
    }

    if let Some(at) = expr.find(" and ").filter(|&at| at > 0) {
        let left = evaluate_at(&expr[..at], sensors, next)?;
        let right = evaluate_at(&expr[at + 5..], sensors, next)?;
        return Some(left && right);
    }

    if let Some(at) = expr.find(" or ").filter(|&at| at > 0) {
        let left = evaluate_at(&expr[..at], sensors, next)?;
        let right = evaluate_at(&expr[at + 4..], sensors, next)?;
        return Some(left || right);
    }

    if let Some(rest) = expr.strip_prefix('!') {
        let operand = rest.trim();
        if operand.contains(" and ") || operand.contains(" or ") {
            error!("Logic: negation of compound operand '{}' needs parentheses", operand);
            return Some(false);
        }
        return evaluate_at(operand, sensors, next).map(|v| !v);
    }

    Some(match expr.as_str() {
        "true" => true,
        "false" => false,
        id => sensors.state_of(id).unwrap_or_else(|| {
            debug!("Logic: unknown sensor '{}'", id);
            false
        }),
    })
}
