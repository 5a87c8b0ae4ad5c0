use log::info;

use super::{NetSpec, NetState, StateRule};
use crate::error::NetForgeError;

/// Returns whether `state` satisfies every constraint set on `rule`.
///
/// `node_name` is only used for the log line explaining a failed match.
pub fn state_meets_rule(state: &NetState, rule: &StateRule, node_name: &str) -> bool {
    if let Some(phase) = rule.phase {
        if phase != state.phase {
            info!(
                "The run state phase ({:?}) differed from the phase ({:?}) specified by a rule in node {}",
                state.phase, phase, node_name
            );
            return false;
        }
    }
    if let Some(min_level) = rule.min_level {
        if state.level < min_level {
            info!(
                "The run state level ({}) is below the min_level ({}) specified by a rule in node {}",
                state.level, min_level, node_name
            );
            return false;
        }
    }
    if let Some(max_level) = rule.max_level {
        if state.level > max_level {
            info!(
                "The run state level ({}) is above the max_level ({}) specified by a rule in node {}",
                state.level, max_level, node_name
            );
            return false;
        }
    }
    if let Some(missing) = rule.stages.iter().find(|s| !state.stages.contains(s)) {
        info!(
            "The run state did not contain stage '{}' specified by a rule in node {}",
            missing, node_name
        );
        return false;
    }
    if let Some(present) = rule.not_stages.iter().find(|s| state.stages.contains(s)) {
        info!(
            "The run state contained a not_stage '{}' specified by a rule in node {}",
            present, node_name
        );
        return false;
    }
    true
}

/// Drops the nodes whose include/exclude rules reject `spec.state`.
///
/// A node is kept by default. Any matching exclude rule drops it; when
/// include rules are present, at least one must match.
///
/// # Errors
/// Returns `NetForgeError::ConflictingRules` for a node declaring both lists.
pub fn filter_nodes(spec: &NetSpec) -> Result<NetSpec, NetForgeError> {
    let mut filtered = spec.clone();
    filtered.nodes.clear();
    for node in &spec.nodes {
        let has_include = !node.include.is_empty();
        let has_exclude = !node.exclude.is_empty();
        if has_include && has_exclude {
            return Err(NetForgeError::ConflictingRules {
                node: node.name.clone(),
            });
        }
        let included = if has_include {
            node.include
                .iter()
                .any(|rule| state_meets_rule(&spec.state, rule, &node.name))
        } else {
            !node
                .exclude
                .iter()
                .any(|rule| state_meets_rule(&spec.state, rule, &node.name))
        };
        if included {
            filtered.nodes.push(node.clone());
        }
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::NodeSpec;
    use crate::types::Phase;

    fn two_phase_spec(state: NetState) -> NetSpec {
        NetSpec::new("filtered")
            .input("data", &[1])
            .node(
                NodeSpec::new("train_only", "Square")
                    .input("data")
                    .output("a")
                    .include(StateRule::phase(Phase::Train)),
            )
            .node(
                NodeSpec::new("not_test", "Square")
                    .input("data")
                    .output("b")
                    .exclude(StateRule::phase(Phase::Test)),
            )
            .node(
                NodeSpec::new("deploy_only", "Square")
                    .input("data")
                    .output("c")
                    .include(StateRule::stage("deploy")),
            )
            .with_state(state)
    }

    fn names(spec: &NetSpec) -> Vec<&str> {
        spec.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_include_and_exclude_by_phase() -> Result<(), NetForgeError> {
        let train = filter_nodes(&two_phase_spec(NetState::new(Phase::Train)))?;
        assert_eq!(names(&train), vec!["train_only", "not_test"]);

        let test = filter_nodes(&two_phase_spec(NetState::new(Phase::Test)))?;
        assert!(names(&test).is_empty());
        Ok(())
    }

    #[test]
    fn test_stage_rules() -> Result<(), NetForgeError> {
        let state = NetState::new(Phase::Test).with_stage("deploy");
        let filtered = filter_nodes(&two_phase_spec(state))?;
        assert_eq!(names(&filtered), vec!["deploy_only"]);
        Ok(())
    }

    #[test]
    fn test_level_bounds() {
        let rule = StateRule {
            min_level: Some(1),
            max_level: Some(3),
            ..Default::default()
        };
        assert!(!state_meets_rule(&NetState::default(), &rule, "n"));
        assert!(state_meets_rule(&NetState::default().with_level(2), &rule, "n"));
        assert!(!state_meets_rule(&NetState::default().with_level(4), &rule, "n"));
    }

    #[test]
    fn test_not_stages() {
        let rule = StateRule {
            not_stages: vec!["deploy".to_string()],
            ..Default::default()
        };
        assert!(state_meets_rule(&NetState::default(), &rule, "n"));
        assert!(!state_meets_rule(&NetState::default().with_stage("deploy"), &rule, "n"));
    }

    #[test]
    fn test_both_rule_lists_is_an_error() {
        let spec = NetSpec::new("bad").node(
            NodeSpec::new("n", "Square")
                .include(StateRule::phase(Phase::Train))
                .exclude(StateRule::phase(Phase::Test)),
        );
        assert_eq!(
            filter_nodes(&spec),
            Err(NetForgeError::ConflictingRules {
                node: "n".to_string()
            })
        );
    }
}
