//! Agent type & cognitive-pattern selection (spec.md §4.4.1).
//!
//! Deterministic given a strategy and a zero-based index, so scale events
//! are idempotent: the same index always yields the same type, regardless
//! of how many times the cluster reconciler recomputes it.

use crate::domain::models::{AgentTemplate, AgentType, CognitivePattern, Strategy};

/// Picks the agent type for the given zero-based index under a strategy.
pub fn select_agent_type(strategy: Strategy, index: usize) -> AgentType {
    match strategy {
        Strategy::Specialized => {
            let cycle = AgentType::SPECIALIZED_CYCLE;
            cycle[index % cycle.len()]
        }
        // `balanced` is the default for every other strategy: index 0 is
        // always the coordinator, everyone else is a coder.
        _ => {
            if index == 0 {
                AgentType::Coordinator
            } else {
                AgentType::Coder
            }
        }
    }
}

/// Picks the cognitive pattern for the given zero-based index.
///
/// Cycles through the template's declared patterns if any are configured,
/// otherwise falls back to the canonical default cycle.
pub fn select_cognitive_pattern(template: &AgentTemplate, index: usize) -> CognitivePattern {
    if template.cognitive_patterns.is_empty() {
        let cycle = CognitivePattern::DEFAULT_CYCLE;
        cycle[index % cycle.len()]
    } else {
        template.cognitive_patterns[index % template.cognitive_patterns.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_has_one_coordinator_then_all_coders() {
        assert_eq!(select_agent_type(Strategy::Balanced, 0), AgentType::Coordinator);
        for i in 1..5 {
            assert_eq!(select_agent_type(Strategy::Balanced, i), AgentType::Coder);
        }
    }

    #[test]
    fn specialized_cycles_through_canonical_roles() {
        let expected = [
            AgentType::Coordinator,
            AgentType::Researcher,
            AgentType::Coder,
            AgentType::Analyst,
            AgentType::Tester,
            AgentType::Coordinator, // wraps
        ];
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(select_agent_type(Strategy::Specialized, i), *want);
        }
    }

    #[test]
    fn selection_is_deterministic_for_the_same_index() {
        for i in 0..20 {
            assert_eq!(
                select_agent_type(Strategy::Specialized, i),
                select_agent_type(Strategy::Specialized, i)
            );
        }
    }

    #[test]
    fn cognitive_pattern_falls_back_to_default_cycle() {
        let template = AgentTemplate::default();
        let expected = CognitivePattern::DEFAULT_CYCLE;
        for i in 0..expected.len() {
            assert_eq!(select_cognitive_pattern(&template, i), expected[i]);
        }
    }

    #[test]
    fn cognitive_pattern_uses_template_cycle_when_present() {
        let template = AgentTemplate {
            cognitive_patterns: vec![CognitivePattern::Critical, CognitivePattern::Lateral],
            ..Default::default()
        };
        assert_eq!(select_cognitive_pattern(&template, 0), CognitivePattern::Critical);
        assert_eq!(select_cognitive_pattern(&template, 1), CognitivePattern::Lateral);
        assert_eq!(select_cognitive_pattern(&template, 2), CognitivePattern::Critical);
    }
}
