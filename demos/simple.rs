// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The example keeps a small todo list in a store, applies a few transactions to it and
//! shows which parts of the tree are shared between consecutive snapshots.

use bistate::{Node, Store, Value, flush_deferred, transact, transact_deferred, value};
use std::error::Error;

fn todos(state: &Node) -> Result<Node, Box<dyn Error>> {
    state
        .get("todos")
        .and_then(Value::into_node)
        .ok_or_else(|| "state has no todo list".into())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // The store follows the tree across snapshots and tells every listener about new ones.
    let store = Store::new(value!({
        "filter": "all",
        "todos": [
            { "text": "learn rust", "done": false },
            { "text": "write tests", "done": false }
        ]
    }))?;
    store.subscribe(|next| println!("new snapshot: {}", next.to_json()));

    let first = store.get_state();

    // --- Explicit transaction ---
    // All writes inside one `transact` call produce exactly one new snapshot.
    transact(|| -> Result<(), Box<dyn Error>> {
        let list = todos(&store.get_state())?;
        let item = list.get(0).and_then(Value::into_node).ok_or("missing todo")?;
        item.set("done", true)?;
        list.push(value!({ "text": "ship it", "done": false }))?;
        Ok(())
    })?;

    let second = store.get_state();
    let (before, after) = (todos(&first)?, todos(&second)?);
    // The first snapshot never changes.
    println!("first snapshot is still: {}", first.to_json());
    // The untouched second todo is the very same node in both snapshots.
    println!(
        "second todo shared between snapshots: {}",
        before.get(1) == after.get(1)
    );

    // --- Deferred transactions ---
    // Deferred commits wait for `flush_deferred`, and a later write to the same root
    // supersedes an earlier queued commit.
    transact_deferred(|| store.get_state().set("filter", "done"))?;
    transact_deferred(|| store.get_state().set("filter", "open"))?;
    println!("deferred commits that ran: {}", flush_deferred());

    println!("final state: {:#}", store.get_state().to_json());
    Ok(())
}
