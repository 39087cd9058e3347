// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
}

#[parameterized(
    bool_true = { "true", true },
    bool_false = { "false", false },
    yes_word = { "\"Yes\"", true },
    lower_y = { "\"y\"", true },
    t_word = { "\"True\"", true },
    one_string = { "\"1\"", true },
    no_word = { "\"no\"", false },
    empty_string = { "\"\"", false },
    one_int = { "1", true },
    zero_int = { "0", false },
    negative_int = { "-3", true },
    null_value = { "~", false },
    sequence = { "[1, 2]", false },
)]
fn coerces_scalars(text: &str, expected: bool) {
    assert_eq!(truthy(&yaml(text)), expected);
}
