//! A miniKanren-style relational core: logic variables, substitutions,
//! `walk`, `unify`, and goals (§4.5.1).
//!
//! Streams are eager sequences here, per the design note that a correct
//! implementation may choose eager or lazy interleaving without changing
//! observable results — the synthesis problems this engine serves are
//! small and finite.

use serde_json::Value as Json;
use std::collections::HashMap;
use std::rc::Rc;

/// A unique identity carrying a display name. Two variables sharing a
/// display name are still distinct identities (§3 "Logic variable").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LVar {
    pub id: u64,
    pub name: Rc<str>,
}

impl LVar {
    pub fn new(id: u64, name: impl Into<Rc<str>>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A relational term: either a concrete JSON-ish value, a logic variable,
/// an ordered sequence, or a mapping — matching the runtime `Value`
/// shapes closely enough that `reify` can hand results back as `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum RTerm {
    Var(LVar),
    Atom(Json),
    Seq(Vec<RTerm>),
    Map(Vec<(String, RTerm)>),
}

impl RTerm {
    pub fn atom(v: impl Into<Json>) -> Self {
        RTerm::Atom(v.into())
    }
}

/// An append-only mapping from logic variable to term. Implemented as a
/// persistent (`Rc`-backed) association list: extending never mutates an
/// existing substitution, matching "always extended, never rebound in
/// place" (§3).
#[derive(Debug, Clone, Default)]
pub struct Subst {
    frames: Rc<Vec<(LVar, RTerm)>>,
}

impl Subst {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn extend(&self, var: LVar, term: RTerm) -> Subst {
        let mut frames = (*self.frames).clone();
        frames.push((var, term));
        Subst {
            frames: Rc::new(frames),
        }
    }

    fn lookup(&self, var: &LVar) -> Option<&RTerm> {
        self.frames
            .iter()
            .rev()
            .find(|(v, _)| v == var)
            .map(|(_, t)| t)
    }
}

/// Follows chains of variable bindings through `s`, stopping at either a
/// non-variable term or an unbound variable. Total: never panics, never
/// loops (by `unify`'s occurs-preventing contract).
pub fn walk(term: &RTerm, s: &Subst) -> RTerm {
    let mut current = term.clone();
    loop {
        match &current {
            RTerm::Var(v) => match s.lookup(v) {
                Some(next) => current = next.clone(),
                None => return current,
            },
            _ => return current,
        }
    }
}

/// Extends `s` so that `u` and `v` become equal under `walk`, or returns
/// `None` on failure. Structural equality short-circuits; otherwise walks
/// both sides and recurses structurally.
pub fn unify(u: &RTerm, v: &RTerm, s: &Subst) -> Option<Subst> {
    let u = walk(u, s);
    let v = walk(v, s);
    if u == v {
        return Some(s.clone());
    }
    match (&u, &v) {
        (RTerm::Var(var), _) => bind(var.clone(), v, s),
        (_, RTerm::Var(var)) => bind(var.clone(), u, s),
        (RTerm::Seq(us), RTerm::Seq(vs)) if us.len() == vs.len() => {
            let mut cur = s.clone();
            for (ui, vi) in us.iter().zip(vs.iter()) {
                cur = unify(ui, vi, &cur)?;
            }
            Some(cur)
        }
        (RTerm::Map(um), RTerm::Map(vm)) => {
            let mut uk: Vec<&String> = um.iter().map(|(k, _)| k).collect();
            let mut vk: Vec<&String> = vm.iter().map(|(k, _)| k).collect();
            uk.sort();
            vk.sort();
            if uk != vk {
                return None;
            }
            let mut cur = s.clone();
            for (k, uval) in um {
                let vval = vm.iter().find(|(k2, _)| k2 == k).map(|(_, t)| t)?;
                cur = unify(uval, vval, &cur)?;
            }
            Some(cur)
        }
        _ => None,
    }
}

/// Binds `var` to `term`, refusing to create a self-referential cycle
/// (binding a variable to a term that, after walking, is that same
/// variable under a different value).
fn bind(var: LVar, term: RTerm, s: &Subst) -> Option<Subst> {
    if let RTerm::Var(other) = &term {
        if *other == var {
            return Some(s.clone());
        }
    }
    Some(s.extend(var, term))
}

/// A goal is a function from substitution to a sequence of substitutions.
pub type Goal = Rc<dyn Fn(&Subst) -> Vec<Subst>>;

pub fn eq_goal(u: RTerm, v: RTerm) -> Goal {
    Rc::new(move |s: &Subst| match unify(&u, &v, s) {
        Some(s2) => vec![s2],
        None => vec![],
    })
}

/// Threads substitutions through every goal in order; any failure yields
/// the empty stream.
pub fn conj(goals: Vec<Goal>) -> Goal {
    Rc::new(move |s: &Subst| {
        let mut stream = vec![s.clone()];
        for g in &goals {
            let mut next = Vec::new();
            for s in &stream {
                next.extend(g(s));
            }
            stream = next;
            if stream.is_empty() {
                break;
            }
        }
        stream
    })
}

/// Concatenates the streams produced by each goal.
pub fn disj(goals: Vec<Goal>) -> Goal {
    Rc::new(move |s: &Subst| goals.iter().flat_map(|g| g(s)).collect())
}

/// A session-scoped monotonic counter minting globally unique logic
/// variable identities (§9 "Global counters").
#[derive(Debug, Default)]
pub struct VarCounter {
    next: u64,
}

impl VarCounter {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn fresh_var(&mut self, name: impl Into<Rc<str>>) -> LVar {
        let id = self.next;
        self.next += 1;
        LVar::new(id, name)
    }
}

/// Allocates `n` fresh variables and passes them to `body`, which builds
/// the actual goal from them.
pub fn fresh(counter: &mut VarCounter, n: usize, body: impl FnOnce(Vec<LVar>) -> Goal) -> Goal {
    let vars: Vec<LVar> = (0..n).map(|i| counter.fresh_var(format!("_v{i}"))).collect();
    body(vars)
}

/// Starts from the empty substitution and truncates the goal's stream to
/// `max_results`.
pub fn run(goal: &Goal, max_results: usize) -> Vec<Subst> {
    let mut results = goal(&Subst::empty());
    results.truncate(max_results);
    results
}

/// Walks `term` through `s`, recursing into sequences/mappings, and
/// renders unbound variables as `_.<name>`. Total: never fails.
pub fn reify(term: &RTerm, s: &Subst) -> Json {
    match walk(term, s) {
        RTerm::Var(v) => Json::String(format!("_.{}", v.name)),
        RTerm::Atom(j) => j,
        RTerm::Seq(items) => Json::Array(items.iter().map(|t| reify(t, s)).collect()),
        RTerm::Map(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in &pairs {
                map.insert(k.clone(), reify(v, s));
            }
            Json::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_follows_chains_to_a_concrete_value() {
        let mut counter = VarCounter::new();
        let x = counter.fresh_var("x");
        let y = counter.fresh_var("y");
        let s = Subst::empty()
            .extend(x.clone(), RTerm::Var(y.clone()))
            .extend(y, RTerm::atom(5));
        assert_eq!(walk(&RTerm::Var(x), &s), RTerm::atom(5));
    }

    #[test]
    fn unify_sequences_element_wise() {
        let mut counter = VarCounter::new();
        let x = counter.fresh_var("x");
        let s = unify(
            &RTerm::Seq(vec![RTerm::Var(x.clone()), RTerm::atom(2)]),
            &RTerm::Seq(vec![RTerm::atom(1), RTerm::atom(2)]),
            &Subst::empty(),
        )
        .unwrap();
        assert_eq!(walk(&RTerm::Var(x), &s), RTerm::atom(1));
    }

    #[test]
    fn unify_fails_on_primitive_mismatch() {
        assert!(unify(&RTerm::atom(1), &RTerm::atom(2), &Subst::empty()).is_none());
    }

    #[test]
    fn conj_threads_and_disj_concatenates() {
        let mut counter = VarCounter::new();
        let x = counter.fresh_var("x");
        let g = disj(vec![
            eq_goal(RTerm::Var(x.clone()), RTerm::atom(1)),
            eq_goal(RTerm::Var(x.clone()), RTerm::atom(2)),
        ]);
        let results = run(&g, 10);
        assert_eq!(results.len(), 2);
        let values: Vec<Json> = results.iter().map(|s| reify(&RTerm::Var(x.clone()), s)).collect();
        assert_eq!(values, vec![Json::from(1), Json::from(2)]);
    }

    #[test]
    fn reify_renders_unbound_variables_and_never_panics() {
        let mut counter = VarCounter::new();
        let x = counter.fresh_var("q");
        let s = Subst::empty();
        assert_eq!(reify(&RTerm::Var(x), &s), Json::String("_.q".into()));
    }

    #[test]
    fn binding_a_variable_to_itself_is_a_no_op() {
        let mut counter = VarCounter::new();
        let x = counter.fresh_var("x");
        let s = unify(&RTerm::Var(x.clone()), &RTerm::Var(x.clone()), &Subst::empty()).unwrap();
        assert_eq!(walk(&RTerm::Var(x.clone()), &s), RTerm::Var(x));
    }
}
