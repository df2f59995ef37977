//! Thumb ratings.
//!
//! [`ReactionEngine`] keeps a rater's `liked` / `notLiked` sets and a todo's
//! `thumbs_up` / `thumbs_down` counters moving together. It runs as a short
//! sequence of single-document store calls:
//!
//! ```text
//! pull(left set) → counter(left) -1 → push(entered set) → counter(entered) +1
//! ```
//!
//! Steps that do not apply to a transition are skipped, and a counter only
//! moves when its pull or push actually changed the set. The sequence is not
//! a transaction; the first failing call stops it and is returned to the
//! caller. Because the rater's state is re-derived from set membership on
//! every request, a sequence cut short leaves membership that the next
//! request from the same rater starts from. Counter drift is reported by
//! `rythm audit`.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::app::{Result, RythmError};
use crate::domain::{Reaction, ReactionState, Todo, Transition};
use crate::store::ReactionStore;

#[derive(Clone)]
pub struct ReactionEngine {
    store: Arc<dyn ReactionStore>,
}

impl ReactionEngine {
    pub fn new(store: Arc<dyn ReactionStore>) -> Self {
        Self { store }
    }

    /// Apply `reaction` from `rater_id` to `todo_id` and return the todo
    /// with its updated counters.
    pub async fn apply_reaction(
        &self,
        rater_id: &str,
        todo_id: &str,
        reaction: Reaction,
    ) -> Result<Todo> {
        let todo = self
            .store
            .find_todo(todo_id)
            .await?
            .filter(|todo| todo.visible_to(Some(rater_id)))
            .ok_or_else(|| RythmError::TodoNotFound(todo_id.to_string()))?;

        if todo.is_owned_by(rater_id) {
            warn!(rater_id, todo_id, "Rejected reaction on own todo");
            return Err(RythmError::SelfReactionForbidden);
        }

        let state = self.current_state(rater_id, todo_id, reaction).await?;
        let transition = Transition::next(state, reaction);
        debug!(
            rater_id,
            todo_id,
            request = reaction.as_str(),
            from = ?transition.from,
            to = ?transition.to,
            thumbs_up = transition.thumbs_up_delta(),
            thumbs_down = transition.thumbs_down_delta(),
            "Applying reaction"
        );

        // A counter only moves with a membership change this call made, so
        // a concurrent request from the same rater cannot count twice.
        if let Some(left) = transition.leave {
            let pulled = self
                .store
                .pull_reaction(rater_id, todo_id, left)
                .await
                .inspect_err(|e| error!(rater_id, todo_id, "Pull from {} failed: {e}", left.set_name()))?;
            if pulled {
                self.store
                    .adjust_thumbs(todo_id, left, -1)
                    .await
                    .inspect_err(|e| {
                        error!(todo_id, "Decrement of {} failed: {e}", left.counter_column())
                    })?;
            } else {
                debug!(rater_id, todo_id, "Already out of {}", left.set_name());
            }
        }

        if let Some(entered) = transition.enter {
            let pushed = self
                .store
                .push_reaction(rater_id, todo_id, entered)
                .await
                .inspect_err(|e| {
                    error!(rater_id, todo_id, "Push to {} failed: {e}", entered.set_name())
                })?;
            if pushed {
                self.store
                    .adjust_thumbs(todo_id, entered, 1)
                    .await
                    .inspect_err(|e| {
                        error!(todo_id, "Increment of {} failed: {e}", entered.counter_column())
                    })?;
            } else {
                debug!(rater_id, todo_id, "Already in {}", entered.set_name());
            }
        }

        self.store
            .find_todo(todo_id)
            .await?
            .ok_or_else(|| RythmError::TodoNotFound(todo_id.to_string()))
    }

    async fn current_state(
        &self,
        rater_id: &str,
        todo_id: &str,
        request: Reaction,
    ) -> Result<ReactionState> {
        let in_liked = self
            .store
            .has_reaction(rater_id, todo_id, Reaction::Up)
            .await?;
        let in_not_liked = self
            .store
            .has_reaction(rater_id, todo_id, Reaction::Down)
            .await?;

        Ok(ReactionState::from_membership(
            in_liked,
            in_not_liked,
            request,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::{NewTodo, NewUser, User};
    use crate::store::{SqliteStore, TodoStore, UserStore};

    fn draft() -> NewTodo {
        NewTodo {
            title: "Weekend hike".into(),
            description: "Trail mix and water".into(),
            category: "outdoors".into(),
            private: false,
            list: vec![],
            master_id: None,
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        engine: ReactionEngine,
        owner: User,
        todo: Todo,
    }

    async fn add_user(store: &SqliteStore, name: &str) -> User {
        store
            .create_user(&NewUser::new(
                Some(format!("{name}@example.com")),
                Some(name.to_string()),
            ))
            .await
            .unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let owner = add_user(&store, "carol").await;
        let todo = Todo::new(&owner.user_id, "carol", draft(), None);
        store.insert_todo(&todo).await.unwrap();
        let engine = ReactionEngine::new(store.clone());

        Fixture {
            store,
            engine,
            owner,
            todo,
        }
    }

    async fn sets(store: &SqliteStore, user_id: &str) -> (Vec<String>, Vec<String>) {
        let user = store.get_user(user_id).await.unwrap().unwrap();
        (user.liked, user.not_liked)
    }

    #[tokio::test]
    async fn test_up_down_scenario() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;
        let id = f.todo.todo_id.as_str();

        let t = f.engine.apply_reaction(&a.user_id, id, Reaction::Up).await.unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (1, 0));

        let t = f.engine.apply_reaction(&a.user_id, id, Reaction::Up).await.unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 0));

        let t = f.engine.apply_reaction(&a.user_id, id, Reaction::Down).await.unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 1));

        let (liked, not_liked) = sets(&f.store, &a.user_id).await;
        assert!(!liked.contains(&f.todo.todo_id));
        assert!(not_liked.contains(&f.todo.todo_id));
    }

    #[tokio::test]
    async fn test_switching_moves_both_counters() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;
        let id = f.todo.todo_id.as_str();

        f.engine.apply_reaction(&a.user_id, id, Reaction::Down).await.unwrap();
        let t = f.engine.apply_reaction(&a.user_id, id, Reaction::Up).await.unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (1, 0));

        let (liked, not_liked) = sets(&f.store, &a.user_id).await;
        assert_eq!(liked, vec![f.todo.todo_id.clone()]);
        assert!(not_liked.is_empty());
    }

    #[tokio::test]
    async fn test_two_identical_requests_restore_state() {
        for reaction in [Reaction::Up, Reaction::Down] {
            let f = fixture().await;
            let a = add_user(&f.store, "alice").await;
            let b = add_user(&f.store, "bob").await;
            let id = f.todo.todo_id.as_str();

            // Someone else's reaction must survive the toggle untouched.
            f.engine.apply_reaction(&b.user_id, id, Reaction::Down).await.unwrap();
            let before = f.store.get_todo(id).await.unwrap().unwrap();
            let sets_before = sets(&f.store, &a.user_id).await;

            f.engine.apply_reaction(&a.user_id, id, reaction).await.unwrap();
            let after = f.engine.apply_reaction(&a.user_id, id, reaction).await.unwrap();

            assert_eq!(after.thumbs_up, before.thumbs_up);
            assert_eq!(after.thumbs_down, before.thumbs_down);
            assert_eq!(sets(&f.store, &a.user_id).await, sets_before);
        }
    }

    #[tokio::test]
    async fn test_owner_cannot_react() {
        let f = fixture().await;

        let err = f
            .engine
            .apply_reaction(&f.owner.user_id, &f.todo.todo_id, Reaction::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, RythmError::SelfReactionForbidden));
        assert_eq!(err.status_code(), 401);

        let t = f.store.get_todo(&f.todo.todo_id).await.unwrap().unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 0));
        let (liked, not_liked) = sets(&f.store, &f.owner.user_id).await;
        assert!(liked.is_empty() && not_liked.is_empty());
    }

    #[tokio::test]
    async fn test_missing_todo() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;

        let err = f
            .engine
            .apply_reaction(&a.user_id, "todo-missing", Reaction::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, RythmError::TodoNotFound(_)));
    }

    #[tokio::test]
    async fn test_counters_match_sets_after_mixed_sequence() {
        let f = fixture().await;
        let mut raters = Vec::new();
        for name in ["r0", "r1", "r2", "r3"] {
            raters.push(add_user(&f.store, name).await);
        }
        let second = Todo::new(&f.owner.user_id, "carol", draft(), None);
        f.store.insert_todo(&second).await.unwrap();
        let todos = [f.todo.todo_id.clone(), second.todo_id.clone()];

        // Deterministic walk through every rater/todo/reaction combination.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..120 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let rater = &raters[(seed % 4) as usize];
            let todo_id = &todos[((seed >> 8) % 2) as usize];
            let reaction = if (seed >> 16) % 2 == 0 {
                Reaction::Up
            } else {
                Reaction::Down
            };

            assert_ok!(f.engine.apply_reaction(&rater.user_id, todo_id, reaction).await);

            let (liked, not_liked) = sets(&f.store, &rater.user_id).await;
            assert!(liked.iter().all(|id| !not_liked.contains(id)));
        }

        let audit = f.store.thumb_audit().await.unwrap();
        assert!(audit.is_clean(), "{audit:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_raters_on_same_todo() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;
        let b = add_user(&f.store, "bob").await;

        let up = {
            let engine = f.engine.clone();
            let (rater, id) = (b.user_id.clone(), f.todo.todo_id.clone());
            tokio::spawn(async move { engine.apply_reaction(&rater, &id, Reaction::Up).await })
        };
        let down = {
            let engine = f.engine.clone();
            let (rater, id) = (a.user_id.clone(), f.todo.todo_id.clone());
            tokio::spawn(async move { engine.apply_reaction(&rater, &id, Reaction::Down).await })
        };
        assert_ok!(up.await.unwrap());
        assert_ok!(down.await.unwrap());

        let t = f.store.get_todo(&f.todo.todo_id).await.unwrap().unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (1, 1));
        assert!(sets(&f.store, &b.user_id).await.0.contains(&f.todo.todo_id));
        assert!(sets(&f.store, &a.user_id).await.1.contains(&f.todo.todo_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_raters() {
        let f = fixture().await;
        let mut raters = Vec::new();
        for i in 0..16 {
            raters.push(add_user(&f.store, &format!("rater{i}")).await);
        }

        let handles = raters.iter().enumerate().map(|(i, rater)| {
            let engine = f.engine.clone();
            let rater = rater.user_id.clone();
            let id = f.todo.todo_id.clone();
            let reaction = if i % 4 == 0 { Reaction::Down } else { Reaction::Up };
            tokio::spawn(async move { engine.apply_reaction(&rater, &id, reaction).await })
        });

        for result in futures::future::join_all(handles).await {
            assert_ok!(result.unwrap());
        }

        let t = f.store.get_todo(&f.todo.todo_id).await.unwrap().unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (12, 4));
        assert!(f.store.thumb_audit().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_private_todo_hidden_from_other_raters() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;
        let mut hidden = draft();
        hidden.private = true;
        let secret = Todo::new(&f.owner.user_id, "carol", hidden, None);
        f.store.insert_todo(&secret).await.unwrap();

        let err = assert_err!(
            f.engine
                .apply_reaction(&a.user_id, &secret.todo_id, Reaction::Up)
                .await
        );
        assert!(matches!(err, RythmError::TodoNotFound(_)));
        assert_eq!(sets(&f.store, &a.user_id).await, (vec![], vec![]));

        let owner = assert_err!(
            f.engine
                .apply_reaction(&f.owner.user_id, &secret.todo_id, Reaction::Up)
                .await
        );
        assert!(matches!(owner, RythmError::SelfReactionForbidden));
    }

    /// SQLite store that holds every caller after its membership reads until
    /// `gate` releases them together.
    struct GatedStore {
        inner: Arc<SqliteStore>,
        gate: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ReactionStore for GatedStore {
        async fn find_todo(&self, todo_id: &str) -> Result<Option<Todo>> {
            self.inner.find_todo(todo_id).await
        }

        async fn has_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction) -> Result<bool> {
            let found = self.inner.has_reaction(user_id, todo_id, reaction).await?;
            if reaction == Reaction::Down {
                self.gate.wait().await;
            }
            Ok(found)
        }

        async fn push_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction) -> Result<bool> {
            self.inner.push_reaction(user_id, todo_id, reaction).await
        }

        async fn pull_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction) -> Result<bool> {
            self.inner.pull_reaction(user_id, todo_id, reaction).await
        }

        async fn adjust_thumbs(&self, todo_id: &str, counter: Reaction, delta: i64) -> Result<()> {
            self.inner.adjust_thumbs(todo_id, counter, delta).await
        }
    }

    async fn double_tap(f: &Fixture, rater: &User, reaction: Reaction) {
        let gated = ReactionEngine::new(Arc::new(GatedStore {
            inner: f.store.clone(),
            gate: tokio::sync::Barrier::new(2),
        }));
        let taps = (0..2).map(|_| {
            let engine = gated.clone();
            let (rater, id) = (rater.user_id.clone(), f.todo.todo_id.clone());
            tokio::spawn(async move { engine.apply_reaction(&rater, &id, reaction).await })
        });
        for result in futures::future::join_all(taps).await {
            assert_ok!(result.unwrap());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_rater_double_tap_counts_once() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;

        // Both requests read NONE before either writes.
        double_tap(&f, &a, Reaction::Up).await;
        let t = f.store.get_todo(&f.todo.todo_id).await.unwrap().unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (1, 0));
        assert!(f.store.thumb_audit().await.unwrap().is_clean());

        // The next request starts from LIKED and toggles it off.
        let t = f
            .engine
            .apply_reaction(&a.user_id, &f.todo.todo_id, Reaction::Up)
            .await
            .unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 0));
        assert!(f.store.thumb_audit().await.unwrap().is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_rater_double_switch_counts_once() {
        let f = fixture().await;
        let a = add_user(&f.store, "alice").await;
        let b = add_user(&f.store, "bob").await;
        f.engine
            .apply_reaction(&a.user_id, &f.todo.todo_id, Reaction::Up)
            .await
            .unwrap();
        f.engine
            .apply_reaction(&b.user_id, &f.todo.todo_id, Reaction::Up)
            .await
            .unwrap();

        // Both read LIKED, both switch to not_liked.
        double_tap(&f, &a, Reaction::Down).await;
        let t = f.store.get_todo(&f.todo.todo_id).await.unwrap().unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (1, 1));
        assert!(f.store.thumb_audit().await.unwrap().is_clean());
    }

    /// In-memory store that records every call and can fail a chosen one.
    #[derive(Default)]
    struct ScriptedStore {
        owner: String,
        sets: Mutex<HashSet<(String, Reaction)>>,
        counters: Mutex<HashMap<Reaction, i64>>,
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl ScriptedStore {
        fn record(&self, call: String) -> Result<()> {
            let fails = self.fail_on.is_some_and(|f| call == f);
            self.calls.lock().unwrap().push(call);
            if fails {
                return Err(RythmError::StoreUnavailable(rusqlite::Error::InvalidQuery));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| !c.starts_with("find") && !c.starts_with("has"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ReactionStore for ScriptedStore {
        async fn find_todo(&self, todo_id: &str) -> Result<Option<Todo>> {
            self.record("find".into())?;
            let mut todo = Todo::new(&self.owner, "owner", draft(), None);
            todo.todo_id = todo_id.to_string();
            let counters = self.counters.lock().unwrap();
            todo.thumbs_up = counters.get(&Reaction::Up).copied().unwrap_or(0);
            todo.thumbs_down = counters.get(&Reaction::Down).copied().unwrap_or(0);
            Ok(Some(todo))
        }

        async fn has_reaction(&self, user_id: &str, _: &str, reaction: Reaction) -> Result<bool> {
            self.record("has".into())?;
            Ok(self
                .sets
                .lock()
                .unwrap()
                .contains(&(user_id.to_string(), reaction)))
        }

        async fn push_reaction(&self, user_id: &str, _: &str, reaction: Reaction) -> Result<bool> {
            self.record(format!("push {}", reaction.set_name()))?;
            Ok(self
                .sets
                .lock()
                .unwrap()
                .insert((user_id.to_string(), reaction)))
        }

        async fn pull_reaction(&self, user_id: &str, _: &str, reaction: Reaction) -> Result<bool> {
            self.record(format!("pull {}", reaction.set_name()))?;
            Ok(self
                .sets
                .lock()
                .unwrap()
                .remove(&(user_id.to_string(), reaction)))
        }

        async fn adjust_thumbs(&self, _: &str, counter: Reaction, delta: i64) -> Result<()> {
            self.record(format!("{} {delta:+}", counter.counter_column()))?;
            let mut counters = self.counters.lock().unwrap();
            let value = counters.entry(counter).or_insert(0);
            *value = (*value + delta).max(0);
            Ok(())
        }
    }

    fn scripted(fail_on: Option<&'static str>) -> Arc<ScriptedStore> {
        let store = ScriptedStore {
            owner: "rythm-owner".into(),
            fail_on,
            ..Default::default()
        };
        store
            .sets
            .lock()
            .unwrap()
            .insert(("rythm-rater".into(), Reaction::Up));
        store.counters.lock().unwrap().insert(Reaction::Up, 1);
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_switch_removes_before_adding() {
        let store = scripted(None);
        let engine = ReactionEngine::new(store.clone());

        let t = engine
            .apply_reaction("rythm-rater", "todo-1", Reaction::Down)
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![
                "pull liked",
                "thumbs_up -1",
                "push not_liked",
                "thumbs_down +1"
            ]
        );
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 1));
    }

    #[tokio::test]
    async fn test_failure_stops_sequence() {
        let store = scripted(Some("push not_liked"));
        let engine = ReactionEngine::new(store.clone());

        let err = assert_err!(
            engine
                .apply_reaction("rythm-rater", "todo-1", Reaction::Down)
                .await
        );
        assert!(matches!(err, RythmError::StoreUnavailable(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            store.calls(),
            vec!["pull liked", "thumbs_up -1", "push not_liked"]
        );

        // Left in NONE: the retry starts from there and finishes the switch.
        let retry = ReactionEngine::new(Arc::new(ScriptedStore {
            owner: "rythm-owner".into(),
            ..Default::default()
        }));
        let t = retry
            .apply_reaction("rythm-rater", "todo-1", Reaction::Down)
            .await
            .unwrap();
        assert_eq!((t.thumbs_up, t.thumbs_down), (0, 1));
    }

    #[tokio::test]
    async fn test_owner_check_happens_before_any_mutation() {
        let store = Arc::new(ScriptedStore {
            owner: "rythm-rater".into(),
            ..Default::default()
        });
        let engine = ReactionEngine::new(store.clone());

        let err = engine
            .apply_reaction("rythm-rater", "todo-1", Reaction::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, RythmError::SelfReactionForbidden));
        assert!(store.calls().is_empty());
    }
}
