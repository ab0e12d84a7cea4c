//! Fuzz target: logic expression evaluator
//!
//! Feeds arbitrary UTF-8 expressions to `evaluate_logic_expression` over a
//! fixed sensor table and checks:
//! - No panics for any input
//! - The empty expression agrees with `any_active`
//!
//! cargo fuzz run fuzz_logic_expression

#![no_main]

use hour_effect::logic::{SensorLookup, evaluate_logic_expression};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&mask, rest)) = data.split_first() else {
        return;
    };
    let Ok(expr) = core::str::from_utf8(rest) else {
        return;
    };

    let sensors = [
        ("kitchen", mask & 0b0001 != 0),
        ("dining", mask & 0b0010 != 0),
        ("hall", mask & 0b0100 != 0),
        ("desk", mask & 0b1000 != 0),
    ];

    let _ = evaluate_logic_expression(expr, sensors.as_slice());
    assert_eq!(
        evaluate_logic_expression("", sensors.as_slice()),
        sensors.as_slice().any_active()
    );
});
