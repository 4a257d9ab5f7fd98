// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker RPC route table, authoritative for whether a route is
//! initial-session, session, or standalone. Grounded on
//! `pytanque.routes.PETANQUE_ROUTES` in
//! `original_source/inference/sessions.py`.

/// How a route relates to proof state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Produces a new state without consuming one — creates a fresh
    /// ParamsTree root.
    InitialSession,
    /// Consumes a parent state; may or may not produce a new one.
    Session { produces_state: bool },
    /// Neither consumes nor produces a state.
    Standalone,
}

impl RouteKind {
    /// Whether a call to a route of this kind appends a node to a
    /// ParamsTree.
    pub fn produces_state(&self) -> bool {
        matches!(
            self,
            RouteKind::InitialSession | RouteKind::Session { produces_state: true }
        )
    }

    /// Whether this route creates a fresh tree root rather than appending
    /// a child to an existing node.
    pub fn is_initial_session(&self) -> bool {
        matches!(self, RouteKind::InitialSession)
    }
}

/// Look up the kind of a route by name. Unknown routes are treated as
/// `Session { produces_state: false }` (a conservative default: they
/// consume whatever state fields they carry but never add a tree node),
/// since the black-box worker may expose routes this table predates.
pub fn route_kind(route_name: &str) -> RouteKind {
    match route_name {
        "get_state_at_pos" | "get_root_state" | "start" => RouteKind::InitialSession,
        "run" => RouteKind::Session {
            produces_state: true,
        },
        "ast" | "goals" | "complete_goals" | "premises" | "state_equal" | "state_hash"
        | "list_notations_in_statement" => RouteKind::Session {
            produces_state: false,
        },
        "toc" | "ast_at_pos" => RouteKind::Standalone,
        _ => RouteKind::Session {
            produces_state: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_session_routes_produce_state() {
        for route in ["get_state_at_pos", "get_root_state", "start"] {
            assert!(route_kind(route).is_initial_session());
            assert!(route_kind(route).produces_state());
        }
    }

    #[test]
    fn run_is_session_and_produces_state() {
        assert_eq!(
            route_kind("run"),
            RouteKind::Session {
                produces_state: true
            }
        );
        assert!(route_kind("run").produces_state());
        assert!(!route_kind("run").is_initial_session());
    }

    #[test]
    fn query_only_session_routes_do_not_produce_state() {
        for route in ["ast", "goals", "complete_goals", "premises", "state_equal"] {
            assert!(!route_kind(route).produces_state());
            assert!(!route_kind(route).is_initial_session());
        }
    }

    #[test]
    fn standalone_routes_never_produce_state() {
        for route in ["toc", "ast_at_pos"] {
            assert!(!route_kind(route).produces_state());
        }
    }
}
