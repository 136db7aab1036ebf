use std::sync::Arc;

use patch::pool::{StagedPool, find_entry, plan_merge};
use patch::{Constant, merge_into};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn merge_reuses_existing_entries_and_appends_the_rest() {
    let mut pool = Arc::new(names(&["print", "linehook"]));
    let indices = merge_into(&mut pool, &names(&["linehook", "breakpoint_callback"]))
        .expect("merge should succeed");
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(*pool, names(&["print", "linehook", "breakpoint_callback"]));

    let again = merge_into(&mut pool, &names(&["linehook", "breakpoint_callback"]))
        .expect("merge should succeed");
    assert_eq!(again, indices);
    assert_eq!(pool.len(), 3);
}

#[test]
fn duplicate_requests_share_one_slot() {
    let plan = plan_merge(&names(&["a"]), &names(&["b", "b", "a"]));
    assert_eq!(plan.indices(), &[1, 1, 0]);
    assert_eq!(plan.appended(), names(&["b"]).as_slice());
}

#[test]
fn constants_compare_by_value_and_type() {
    let pool = vec![
        Constant::Int(1),
        Constant::Bool(true),
        Constant::Float(f64::NAN),
        Constant::Str("1".to_string()),
    ];
    assert_eq!(find_entry(&pool, &Constant::Int(1)), Some(0));
    assert_eq!(find_entry(&pool, &Constant::Bool(true)), Some(1));
    assert_eq!(find_entry(&pool, &Constant::Float(f64::NAN)), Some(2));
    assert_eq!(find_entry(&pool, &Constant::Str("1".to_string())), Some(3));
    assert_eq!(find_entry(&pool, &Constant::Float(1.0)), None);
}

#[test]
fn sole_owner_is_extended_in_place() {
    let mut pool = Arc::new(names(&["a"]));
    let before = Arc::as_ptr(&pool);
    let staged = plan_merge(pool.as_slice(), &names(&["b"]))
        .stage(&mut pool)
        .expect("stage should succeed");
    assert!(matches!(staged, StagedPool::InPlace(_)));
    assert_eq!(pool.len(), 1, "staging leaves the pool untouched");

    staged.commit(&mut pool);
    assert_eq!(Arc::as_ptr(&pool), before);
    assert_eq!(*pool, names(&["a", "b"]));
}

#[test]
fn shared_pool_is_copied_not_mutated() {
    let mut pool = Arc::new(names(&["a"]));
    let sibling = Arc::clone(&pool);
    let indices = merge_into(&mut pool, &names(&["b"])).expect("merge should succeed");

    assert_eq!(indices, vec![1]);
    assert!(!Arc::ptr_eq(&pool, &sibling));
    assert_eq!(*sibling, names(&["a"]));
    assert_eq!(*pool, names(&["a", "b"]));
}

#[test]
fn noop_merge_stages_nothing() {
    let mut pool = Arc::new(names(&["a"]));
    let sibling = Arc::clone(&pool);
    let plan = plan_merge(pool.as_slice(), &names(&["a"]));
    assert!(plan.is_noop());
    let staged = plan.stage(&mut pool).expect("stage should succeed");
    assert!(matches!(staged, StagedPool::Unchanged));
    staged.commit(&mut pool);
    assert!(Arc::ptr_eq(&pool, &sibling));
}
