//! Per-resource strategy evaluation. Pure over a strategy set, so the checker
//! can resolve strategies once and evaluate every requested resource.

use crate::model::{Operation, PrincipalRef, ResourceEntry, StrategyAction, StrategyDetail};

pub const REASON_EXPLICIT_DENY: &str = "explicit_deny";
pub const REASON_STRATEGY_ALLOW: &str = "strategy_allow";
pub const REASON_DEFAULT_STRATEGY_ALLOW: &str = "default_strategy_allow";
pub const REASON_NOT_PERMITTED: &str = "operation_not_permitted";
pub const REASON_DEFAULT_POLICY: &str = "default_policy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allow: bool,
    pub reason: &'static str,
}

impl Verdict {
    const fn allow(reason: &'static str) -> Self { Self { allow: true, reason } }
    const fn deny(reason: &'static str) -> Self { Self { allow: false, reason } }
}

/// Decide one resource. Order: any matching deny; any other matching strategy
/// that permits `op`; the caller's own default strategy; deny when something
/// matched; otherwise the global default (`strict` denies).
pub fn evaluate(
    strategies: &[StrategyDetail],
    caller: Option<&PrincipalRef>,
    op: Operation,
    resource: &ResourceEntry,
    strict: bool,
) -> Verdict {
    let matching: Vec<&StrategyDetail> = strategies.iter().filter(|s| s.valid && s.covers(resource)).collect();
    if matching.iter().any(|s| s.action == StrategyAction::Deny) {
        return Verdict::deny(REASON_EXPLICIT_DENY);
    }
    let is_own_default = |s: &StrategyDetail| caller.map_or(false, |p| s.is_default_of(p));
    if matching.iter().any(|s| !is_own_default(s) && s.action.permits(op)) {
        return Verdict::allow(REASON_STRATEGY_ALLOW);
    }
    if matching.iter().any(|s| is_own_default(s) && s.action.permits(op)) {
        return Verdict::allow(REASON_DEFAULT_STRATEGY_ALLOW);
    }
    if !matching.is_empty() {
        return Verdict::deny(REASON_NOT_PERMITTED);
    }
    if strict { Verdict::deny(REASON_DEFAULT_POLICY) } else { Verdict::allow(REASON_DEFAULT_POLICY) }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{ResourceType, WILDCARD_RESOURCE};

    fn strategy(id: &str, action: StrategyAction, principal: &PrincipalRef, default: bool, res: &[(ResourceType, &str)]) -> StrategyDetail {
        let now = Utc::now();
        let mut s = StrategyDetail {
            id: id.into(),
            name: id.into(),
            action,
            comment: String::new(),
            principals: vec![],
            default,
            owner: "tenant".into(),
            resources: vec![],
            valid: true,
            revision: "r".into(),
            create_time: now,
            modify_time: now,
        };
        s.add_principal(principal);
        for (t, r) in res { s.add_resource(*t, r); }
        s
    }

    fn ns(name: &str) -> ResourceEntry { ResourceEntry::namespace(name, "tenant") }

    #[test]
    fn deny_beats_default_allow() {
        let me = PrincipalRef::user("u1");
        let set = vec![
            strategy("d", StrategyAction::ReadWrite, &me, true, &[(ResourceType::Namespaces, WILDCARD_RESOURCE)]),
            strategy("x", StrategyAction::Deny, &me, false, &[(ResourceType::Namespaces, "ns1")]),
        ];
        let v = evaluate(&set, Some(&me), Operation::Read, &ns("ns1"), false);
        assert_eq!(v, Verdict::deny(REASON_EXPLICIT_DENY));
        let other = evaluate(&set, Some(&me), Operation::Read, &ns("ns2"), false);
        assert_eq!(other, Verdict::allow(REASON_DEFAULT_STRATEGY_ALLOW));
    }

    #[test]
    fn group_allow_wins_over_readonly_direct() {
        let me = PrincipalRef::user("u1");
        let grp = PrincipalRef::group("g1");
        let set = vec![
            strategy("direct", StrategyAction::ReadOnly, &me, false, &[(ResourceType::Namespaces, "ns1")]),
            strategy("group", StrategyAction::ReadWrite, &grp, false, &[(ResourceType::Namespaces, "ns1")]),
        ];
        let v = evaluate(&set, Some(&me), Operation::Modify, &ns("ns1"), true);
        assert_eq!(v, Verdict::allow(REASON_STRATEGY_ALLOW));
    }

    #[test]
    fn matched_but_not_permitted_denies_even_when_lenient() {
        let me = PrincipalRef::user("u1");
        let set = vec![strategy("ro", StrategyAction::ReadOnly, &me, false, &[(ResourceType::Namespaces, "ns1")])];
        assert!(evaluate(&set, Some(&me), Operation::Read, &ns("ns1"), false).allow);
        assert_eq!(evaluate(&set, Some(&me), Operation::Delete, &ns("ns1"), false), Verdict::deny(REASON_NOT_PERMITTED));
    }

    #[test]
    fn unmatched_falls_back_to_global_default() {
        let me = PrincipalRef::user("u1");
        assert!(evaluate(&[], Some(&me), Operation::Create, &ns("ns1"), false).allow);
        assert_eq!(evaluate(&[], Some(&me), Operation::Create, &ns("ns1"), true), Verdict::deny(REASON_DEFAULT_POLICY));
        assert!(!evaluate(&[], None, Operation::Read, &ns("ns1"), true).allow);
    }

    #[test]
    fn invalid_strategies_are_ignored() {
        let me = PrincipalRef::user("u1");
        let mut deny = strategy("x", StrategyAction::Deny, &me, false, &[(ResourceType::Namespaces, "ns1")]);
        deny.valid = false;
        assert!(evaluate(&[deny], Some(&me), Operation::Read, &ns("ns1"), false).allow);
    }
}
