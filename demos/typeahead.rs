//! Example: a search box and a submit button
//!
//! Keystrokes are followed with `switch_map`, so a slow response for an
//! outdated query is cancelled instead of overwriting a newer one. Submit
//! clicks go through `exhaust_map`, so double clicks while a request is in
//! flight are ignored.
//!
//! Run with `cargo run --example typeahead`.

use futures::StreamExt;
use rivulet::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// =============================================================================
// Fake backend: each request is a Deferred settled by the "network"
// =============================================================================

#[derive(Default)]
struct Backend {
    pending: RefCell<HashMap<String, Deferred<Vec<String>>>>,
}

impl Backend {
    fn search(self: &Rc<Self>, query: String) -> Observable<Vec<String>> {
        let backend = self.clone();
        Observable::defer(move || {
            println!("  -> search request for {:?}", query);
            let response = Deferred::new();
            backend
                .pending
                .borrow_mut()
                .insert(query.clone(), response.clone());
            response
        })
    }

    fn respond(&self, query: &str, words: &[&str]) {
        let response = self.pending.borrow_mut().remove(query);
        match response {
            Some(response) => {
                println!("  <- response for {:?}", query);
                response.resolve(words.iter().map(|w| w.to_string()).collect());
            }
            None => println!("  <- response for {:?} (nobody waiting)", query),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let backend = Rc::new(Backend::default());

    println!("Typing:");
    let keystrokes = Subject::<String>::new();
    let api = backend.clone();
    let suggestions = keystrokes
        .as_observable()
        .filter(|q| q.len() >= 2)
        .switch_map(move |q| api.search(q))
        .subscribe_next(|words| println!("  suggestions: {}", words.join(", ")));

    keystrokes.next("r".into());
    keystrokes.next("ru".into());
    keystrokes.next("rus".into());
    backend.respond("ru", &["rude", "rug"]);
    backend.respond("rus", &["rust", "rustic"]);

    suggestions.unsubscribe();

    println!("Submitting:");
    let clicks = Subject::<()>::new();
    let submit = Deferred::new();
    let request = submit.clone();
    let (subscription, stream) = clicks
        .as_observable()
        .exhaust_map(move |_| {
            println!("  -> submit request");
            request.clone()
        })
        .take(1)
        .to_stream();

    clicks.next(());
    clicks.next(());
    clicks.next(());
    submit.resolve("saved");

    let outcome: Vec<StreamResult<&str>> = stream.collect().await;
    println!("  outcome: {:?}", outcome);
    subscription.unsubscribe();
}
