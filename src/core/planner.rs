//! # Test Execution Planner Module / 测试执行计划模块
//!
//! This module turns declared test definitions into a flat, ordered list of
//! test instances: one per (shell, parameter binding) pair. Shells form the
//! outer axis and bindings the inner one, so results stay grouped per shell.
//! Definitions are validated here, before anything is scheduled.
//!
//! 此模块将声明的测试定义转换为扁平、有序的测试实例列表：
//! 每个（shell、参数绑定）组合对应一个实例。shell 是外层维度，绑定是内层维度，
//! 因此结果会按 shell 分组。定义在此处进行校验，早于任何调度。

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::EngineError;
use crate::core::models::{is_env_name, Binding, InstanceId, TestDefinition, TestInstance};

/// Matches `{{ name }}` placeholders in a test body.
pub(crate) static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Represents a complete execution plan for a test suite.
/// 表示测试套件的完整执行计划。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Every instance to run, in report order.
    /// 要运行的所有实例，按报告顺序排列。
    pub instances: Vec<TestInstance>,
    /// Number of definitions the plan was built from.
    /// 构建该计划所用的定义数量。
    pub definition_count: usize,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Creates an execution plan for the given definitions.
/// Fails on the first definition that is malformed or expands to nothing,
/// so that no process is spawned for a broken suite.
///
/// 为给定的定义创建执行计划。
/// 遇到第一个格式错误或展开为空的定义时即失败，
/// 因此不会为有问题的套件启动任何进程。
pub fn plan_execution(definitions: Vec<TestDefinition>) -> Result<ExecutionPlan, EngineError> {
    let mut seen = HashSet::new();
    for definition in &definitions {
        if !seen.insert(definition.name.as_str()) {
            return Err(EngineError::InvalidDefinition {
                definition: definition.name.clone(),
                reason: "another test has the same name".into(),
            });
        }
    }

    let definition_count = definitions.len();
    let mut instances = Vec::new();
    for (index, definition) in definitions.into_iter().enumerate() {
        let expanded = expand_definition(index, Arc::new(definition))?;
        instances.extend(expanded);
    }

    for (seq, instance) in instances.iter_mut().enumerate() {
        instance.seq = seq;
    }

    Ok(ExecutionPlan {
        instances,
        definition_count,
    })
}

/// Expands one definition into its instances: shells × bindings, shell outer.
/// 将一个定义展开为其实例：shell × 绑定，shell 在外层。
pub fn expand_definition(
    index: usize,
    definition: Arc<TestDefinition>,
) -> Result<Vec<TestInstance>, EngineError> {
    validate(&definition)?;
    let bindings = bindings(&definition)?;

    let mut instances = Vec::with_capacity(definition.shells.len() * bindings.len());
    for shell in &definition.shells {
        for (binding_index, binding) in bindings.iter().enumerate() {
            instances.push(TestInstance {
                id: InstanceId {
                    definition: index,
                    shell: shell.clone(),
                    binding: binding_index,
                },
                seq: 0,
                definition: Arc::clone(&definition),
                binding: binding.clone(),
            });
        }
    }
    Ok(instances)
}

/// Computes the cartesian product of the definition's parameter axes,
/// first axis outermost. No axes yields a single empty binding. When two
/// axes share a key, the later axis wins.
///
/// 计算定义中各参数维度的笛卡尔积，第一个维度在最外层。
/// 没有维度时产生一个空绑定。两个维度共享同一个键时，以后面的维度为准。
pub fn bindings(definition: &TestDefinition) -> Result<Vec<Binding>, EngineError> {
    let mut product = vec![Binding::new()];

    for (axis_index, axis) in definition.parameters.iter().enumerate() {
        if axis.is_empty() {
            return Err(EngineError::EmptyMatrix {
                definition: definition.name.clone(),
                reason: format!("parameter set #{} has no entries", axis_index + 1),
            });
        }
        product = product
            .iter()
            .flat_map(|prefix| {
                axis.iter().map(move |entry| {
                    let mut merged = prefix.clone();
                    merged.extend(entry.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged
                })
            })
            .collect();
    }

    Ok(product)
}

fn validate(definition: &TestDefinition) -> Result<(), EngineError> {
    let invalid = |reason: String| EngineError::InvalidDefinition {
        definition: definition.name.clone(),
        reason,
    };

    if definition.name.trim().is_empty() {
        return Err(invalid("test name is empty".into()));
    }
    if definition.shells.is_empty() {
        return Err(EngineError::EmptyMatrix {
            definition: definition.name.clone(),
            reason: "no shells are declared".into(),
        });
    }

    let mut shells = HashSet::new();
    for shell in &definition.shells {
        if !shells.insert(shell) {
            return Err(invalid(format!("shell '{shell}' is listed twice")));
        }
    }

    let mut keys = HashSet::new();
    for binding in definition.parameters.iter().flatten() {
        for (key, value) in binding {
            if definition.parameter_mode.exports_env() && !is_env_name(key) {
                return Err(invalid(format!(
                    "parameter '{key}' is not a valid environment variable name"
                )));
            }
            if key.contains('\0') || value.contains('\0') {
                return Err(invalid(format!("parameter '{key}' contains a NUL byte")));
            }
            keys.insert(key.as_str());
        }
    }

    if definition.parameter_mode.substitutes() {
        for captures in PLACEHOLDER.captures_iter(&definition.body) {
            let name = &captures[1];
            if !keys.contains(name) {
                return Err(invalid(format!(
                    "placeholder '{{{{{name}}}}}' does not name a declared parameter"
                )));
            }
        }
    }

    for key in definition.expect.env.keys() {
        if !is_env_name(key) {
            return Err(invalid(format!(
                "expected environment key '{key}' is not a valid variable name"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ParameterMode, ShellKind};

    fn binding(pairs: &[(&str, &str)]) -> Binding {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn zero_axes_yield_one_empty_binding() {
        let def = TestDefinition::new("t", "true").with_shells([ShellKind::Bash]);
        assert_eq!(bindings(&def).unwrap(), vec![Binding::new()]);
    }

    #[test]
    fn axes_multiply_first_axis_outermost() {
        let def = TestDefinition::new("t", "true")
            .with_shells([ShellKind::Bash])
            .with_parameter_set(vec![binding(&[("a", "1")]), binding(&[("a", "2")])])
            .with_parameter_set(vec![
                binding(&[("b", "x")]),
                binding(&[("b", "y")]),
                binding(&[("b", "z")]),
            ]);
        let product = bindings(&def).unwrap();
        assert_eq!(product.len(), 6);
        assert_eq!(product[0], binding(&[("a", "1"), ("b", "x")]));
        assert_eq!(product[2], binding(&[("a", "1"), ("b", "z")]));
        assert_eq!(product[3], binding(&[("a", "2"), ("b", "x")]));
    }

    #[test]
    fn later_axis_wins_on_shared_key() {
        let def = TestDefinition::new("t", "true")
            .with_shells([ShellKind::Bash])
            .with_parameter_set(vec![binding(&[("a", "first")])])
            .with_parameter_set(vec![binding(&[("a", "second")])]);
        assert_eq!(bindings(&def).unwrap(), vec![binding(&[("a", "second")])]);
    }

    #[test]
    fn empty_axis_is_an_empty_matrix() {
        let def = TestDefinition::new("t", "true")
            .with_shells([ShellKind::Bash])
            .with_parameter_set(vec![]);
        assert!(matches!(
            bindings(&def),
            Err(EngineError::EmptyMatrix { .. })
        ));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let def = TestDefinition::new("t", "echo {{missing}}")
            .with_shells([ShellKind::Bash])
            .with_parameter_mode(ParameterMode::Substitute);
        let err = expand_definition(0, Arc::new(def)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition { .. }));
    }

    #[test]
    fn placeholders_are_ignored_in_env_mode() {
        let def = TestDefinition::new("t", "echo {{literal}}").with_shells([ShellKind::Bash]);
        assert_eq!(expand_definition(0, Arc::new(def)).unwrap().len(), 1);
    }

    #[test]
    fn env_mode_requires_identifier_keys() {
        let def = TestDefinition::new("t", "true")
            .with_shells([ShellKind::Bash])
            .with_parameter_set(vec![binding(&[("not-a-name", "1")])]);
        assert!(expand_definition(0, Arc::new(def)).is_err());
    }
}
