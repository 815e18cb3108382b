use serde::{Deserialize, Serialize};

use crate::change::{max_id, Change, Ledger, NewChange};

/// The three ways a ledger may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Prepend a new change; its id is `max(id) + 1` over the current ledger.
    /// Ignored once `max(id)` is `i64::MAX`, since no unique id is left.
    Push { value: NewChange },
    /// Remove the first change with this id, if any
    Delete { id: i64 },
    /// Discard every change
    Reset,
}

/// Apply one action to a ledger, producing the next ledger.
///
/// Pure and deterministic: no I/O, no validation. Ids are derived from the
/// current contents rather than a counter, so deleting the highest id and
/// pushing again hands that id out a second time.
pub fn reduce(current: &[Change], action: Action) -> Ledger {
    match action {
        Action::Reset => Vec::new(),
        Action::Delete { id } => match current.iter().position(|c| c.id == id) {
            Some(idx) => {
                let mut next = Vec::with_capacity(current.len() - 1);
                next.extend_from_slice(&current[..idx]);
                next.extend_from_slice(&current[idx + 1..]);
                next
            }
            None => current.to_vec(),
        },
        Action::Push { value } => {
            let Some(id) = max_id(current).checked_add(1) else {
                return current.to_vec();
            };
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(value.with_id(id));
            next.extend_from_slice(current);
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::balance;

    fn push(amount: f64, description: &str) -> Action {
        Action::Push {
            value: NewChange {
                amount,
                description: description.to_string(),
                time: "2024-01-01T00:00:00.000+00:00".to_string(),
            },
        }
    }

    fn ids(ledger: &[Change]) -> Vec<i64> {
        ledger.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_salary_food_tip_scenario() {
        let ledger = reduce(&[], push(100.0, "salary"));
        assert_eq!(ids(&ledger), vec![1]);
        assert_eq!(ledger[0].description, "salary");
        assert_eq!(balance(&ledger), 100.0);

        let ledger = reduce(&ledger, push(-30.0, "food"));
        assert_eq!(ids(&ledger), vec![2, 1]);
        assert_eq!(balance(&ledger), 70.0);

        let ledger = reduce(&ledger, Action::Delete { id: 1 });
        assert_eq!(ids(&ledger), vec![2]);
        assert_eq!(ledger[0].amount, -30.0);
        assert_eq!(balance(&ledger), -30.0);

        let ledger = reduce(&ledger, push(5.0, "tip"));
        assert_eq!(ids(&ledger), vec![3, 2]);
        assert_eq!(balance(&ledger), -25.0);
    }

    #[test]
    fn test_deleting_max_id_lets_push_reuse_it() {
        let ledger = reduce(&reduce(&[], push(1.0, "a")), push(2.0, "b"));
        assert_eq!(ids(&ledger), vec![2, 1]);

        let ledger = reduce(&ledger, Action::Delete { id: 2 });
        assert_eq!(ids(&ledger), vec![1]);

        let ledger = reduce(&ledger, push(3.0, "c"));
        assert_eq!(ids(&ledger), vec![2, 1]);
        assert_eq!(ledger[0].description, "c");
    }

    #[test]
    fn test_pushes_assign_increasing_ids_newest_first() {
        let mut ledger = Vec::new();
        for n in 1..=10 {
            let before = max_id(&ledger);
            ledger = reduce(&ledger, push(n as f64, &format!("entry {}", n)));
            assert!(ledger[0].id > before);
            assert_eq!(ledger[0].description, format!("entry {}", n));
        }

        let mut sorted = ids(&ledger);
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10);
        assert_eq!(balance(&ledger), 55.0);
    }

    #[test]
    fn test_balance_tracks_interleaved_actions() {
        let amounts = [12.5, -3.0, 40.0, -7.25, 0.75];
        let mut ledger = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            ledger = reduce(&ledger, push(*amount, &format!("#{}", i)));
        }
        assert_eq!(balance(&ledger), amounts.iter().sum::<f64>());

        // Drop the -3.0 entry (id 2)
        ledger = reduce(&ledger, Action::Delete { id: 2 });
        assert_eq!(balance(&ledger), amounts.iter().sum::<f64>() + 3.0);

        ledger = reduce(&ledger, Action::Reset);
        ledger = reduce(&ledger, push(9.0, "fresh"));
        assert_eq!(balance(&ledger), 9.0);
        assert_eq!(ids(&ledger), vec![1]);
    }

    #[test]
    fn test_delete_missing_id_is_identity() {
        let ledger = reduce(&reduce(&[], push(1.0, "a")), push(2.0, "b"));

        let next = reduce(&ledger, Action::Delete { id: 42 });

        assert_eq!(next, ledger);
        assert_eq!(next.len(), ledger.len());
    }

    #[test]
    fn test_delete_removes_exactly_one_and_keeps_order() {
        let mut ledger = Vec::new();
        for n in 0..4 {
            ledger = reduce(&ledger, push(n as f64, "x"));
        }
        assert_eq!(ids(&ledger), vec![4, 3, 2, 1]);

        let next = reduce(&ledger, Action::Delete { id: 3 });

        assert_eq!(next.len(), ledger.len() - 1);
        assert_eq!(ids(&next), vec![4, 2, 1]);
    }

    #[test]
    fn test_reset_always_empties() {
        assert!(reduce(&[], Action::Reset).is_empty());

        let ledger = reduce(&reduce(&[], push(10.0, "a")), push(-4.0, "b"));
        let next = reduce(&ledger, Action::Reset);

        assert!(next.is_empty());
        assert_eq!(balance(&next), 0.0);
    }

    #[test]
    fn test_push_does_not_validate_amount() {
        let ledger = reduce(&[], push(f64::NAN, "broken"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger[0].amount.is_nan());
    }

    #[test]
    fn test_push_at_max_id_leaves_ledger_unchanged() {
        let ledger = crate::change::from_json(
            r#"[{"amount":1.0,"description":"last","time":"t","id":9223372036854775807}]"#,
        )
        .unwrap();

        let next = reduce(&ledger, push(2.0, "overflow"));

        assert_eq!(next, ledger);
        assert_eq!(ids(&next), vec![i64::MAX]);

        // Deleting the top id frees room again
        let next = reduce(&reduce(&next, Action::Delete { id: i64::MAX }), push(2.0, "ok"));
        assert_eq!(ids(&next), vec![1]);
    }

    #[test]
    fn test_action_wire_format() {
        let action: Action = serde_json::from_str(r#"{"type":"delete","id":5}"#).unwrap();
        assert_eq!(action, Action::Delete { id: 5 });

        let action: Action = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(action, Action::Reset);

        let action: Action = serde_json::from_str(
            r#"{"type":"push","value":{"amount":3.0,"description":"d","time":"t"}}"#,
        )
        .unwrap();
        assert!(matches!(action, Action::Push { .. }));
    }
}
