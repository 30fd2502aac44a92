//! # Result Evaluation Module / 结果评估模块
//!
//! Pure comparison of what a process did against what its test expected.
//! Every predicate is checked and every mismatch is collected, so a failing
//! verdict tells the whole story rather than only the first difference.
//!
//! 将进程的实际行为与测试的预期进行纯粹的比较。
//! 会检查每个断言并收集所有不匹配项，因此失败的判定会给出完整信息，
//! 而不仅仅是第一个差异。

use crate::core::models::{
    CapturedOutput, EnvironmentSnapshot, ExitCodeExpectation, Expectation, Mismatch, Predicate,
    StreamExpectation, Verdict,
};

/// Produces the verdict of one instance.
///
/// A timed-out process short-circuits to `Verdict::Timeout` without looking
/// at any predicate. Environment expectations use subset semantics: each
/// expected key must be present with the expected value, extra keys are
/// ignored, and a missing snapshot fails every expected key.
///
/// 生成单个实例的判定结果。
///
/// 超时的进程直接得到 `Verdict::Timeout`，不检查任何断言。
/// 环境预期使用子集语义：每个预期的键都必须以预期的值出现，额外的键会被忽略，
/// 缺失快照时每个预期的键都判定为失败。
pub fn evaluate(
    expect: &Expectation,
    output: &CapturedOutput,
    snapshot: Option<&EnvironmentSnapshot>,
) -> Verdict {
    if output.timed_out {
        return Verdict::Timeout {
            after: output.duration,
        };
    }

    let mut mismatches = Vec::new();

    if let Some(mismatch) = check_exit_code(&expect.exit_code, output) {
        mismatches.push(mismatch);
    }

    let streams = [
        (Predicate::Stdout, &expect.stdout, &output.stdout),
        (Predicate::Stderr, &expect.stderr, &output.stderr),
        (Predicate::Combined, &expect.combined, &output.combined),
    ];
    for (predicate, expectation, actual) in streams {
        if !stream_matches(expectation, actual) {
            mismatches.push(Mismatch {
                predicate,
                expected: describe_stream(expectation),
                actual: String::from_utf8_lossy(actual).into_owned(),
            });
        }
    }

    for (key, expected) in &expect.env {
        let actual = snapshot.and_then(|s| s.get(key));
        if actual != Some(expected.as_str()) {
            mismatches.push(Mismatch {
                predicate: Predicate::Env(key.clone()),
                expected: expected.clone(),
                actual: match (snapshot, actual) {
                    (None, _) => "<no environment snapshot>".to_string(),
                    (Some(_), None) => "<unset>".to_string(),
                    (Some(_), Some(value)) => value.to_string(),
                },
            });
        }
    }

    if mismatches.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail { mismatches }
    }
}

fn check_exit_code(expect: &ExitCodeExpectation, output: &CapturedOutput) -> Option<Mismatch> {
    let holds = match (expect, output.exit_code) {
        (ExitCodeExpectation::Any, _) => true,
        (ExitCodeExpectation::Equals(want), Some(code)) => *want == code,
        (ExitCodeExpectation::NonZero, Some(code)) => code != 0,
        (_, None) => false,
    };
    if holds {
        return None;
    }

    let expected = match expect {
        ExitCodeExpectation::Any => "any".to_string(),
        ExitCodeExpectation::Equals(code) => code.to_string(),
        ExitCodeExpectation::NonZero => "non-zero".to_string(),
    };
    let actual = match (output.exit_code, output.signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "none".to_string(),
    };
    Some(Mismatch {
        predicate: Predicate::ExitCode,
        expected,
        actual,
    })
}

/// Whether the raw bytes of a stream satisfy an expectation. `Exact` and
/// `Contains` compare bytes; a regex sees the stream decoded as UTF-8 with
/// invalid sequences replaced.
///
/// 流的原始字节是否满足某个预期。`Exact` 和 `Contains` 按字节比较；
/// 正则表达式匹配按 UTF-8 解码后的流，无效序列会被替换。
pub fn stream_matches(expect: &StreamExpectation, actual: &[u8]) -> bool {
    match expect {
        StreamExpectation::Any => true,
        StreamExpectation::Exact(text) => actual == text.as_bytes(),
        StreamExpectation::Contains(text) => contains_bytes(actual, text.as_bytes()),
        StreamExpectation::Regex(pattern) => pattern.is_match(&String::from_utf8_lossy(actual)),
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

fn describe_stream(expect: &StreamExpectation) -> String {
    match expect {
        StreamExpectation::Any => "anything".to_string(),
        StreamExpectation::Exact(text) => text.clone(),
        StreamExpectation::Contains(text) => format!("contains {text:?}"),
        StreamExpectation::Regex(pattern) => format!("matches /{}/", pattern.as_str()),
    }
}
