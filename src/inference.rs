//! Sample-driven shape inference.
//!
//! Stream JSON samples in and keep one bounded evidence arm per JSON kind. The
//! join ⊔ of two observations is associative and commutative, so sample order
//! never matters. Counts add up under join; everything else is idempotent.
//! [`normalize`] settles per-kind decisions (string enum or plain string) and
//! [`crate::lower::lower_to_schema`] turns the result into a
//! [`Schema`](crate::Schema).
pub mod num;
pub mod str;

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

pub use num::NumC;
pub use str::StrC;

// ------------------------------- Policy ---------------------------------- //

const STRING_ENUM_MAX: usize = 8;
const STRING_ENUM_MAX_LEN: usize = 16;
/// Literal cap before a string arm gives up on being an enum.
const MAX_STR_LITS: usize = 64;

// ------------------------------- State ----------------------------------- //

#[derive(Clone, Debug, Default, PartialEq)]
pub struct U {
    pub nullable: bool,
    pub has_bool: bool,
    pub num: Option<NumC>,
    pub str_: Option<StrC>,
    pub arr: Option<ArrC>,
    pub obj: Option<ObjC>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrC {
    pub item: Box<U>,
    /// Arrays observed for this slot.
    pub samples: u64,
    /// Arrays observed with no elements.
    pub empty: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjC {
    pub fields: BTreeMap<String, FieldC>,
    pub seen_objects: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldC {
    pub ty: U,
    pub present_in: u64,
    /// Required means present and non-null in every object.
    pub non_null_in: u64,
}

impl U {
    pub fn empty() -> Self {
        Self::default()
    }

    /// No evidence of any kind, not even `null`.
    pub fn is_bottom(&self) -> bool {
        !self.nullable && !self.has_bool && self.kinds().is_empty()
    }

    /// Non-null kinds present, in lowering priority order.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.obj.is_some() {
            out.push("object");
        }
        if self.arr.is_some() {
            out.push("array");
        }
        if self.str_.is_some() {
            out.push("string");
        }
        if self.num.is_some() {
            out.push("number");
        }
        if self.has_bool {
            out.push("boolean");
        }
        out
    }
}

// ------------------------------ Observe ---------------------------------- //

pub fn observe_value(v: &Json) -> U {
    match v {
        Json::Null => U { nullable: true, ..U::default() },
        Json::Bool(_) => U { has_bool: true, ..U::default() },
        Json::Number(n) => U { num: Some(NumC::observe(n)), ..U::default() },
        Json::String(s) => U { str_: Some(StrC::observe(s)), ..U::default() },
        Json::Array(xs) => observe_array(xs),
        Json::Object(m) => observe_object(m),
    }
}

fn observe_array(xs: &[Json]) -> U {
    let item = xs.iter().fold(U::empty(), |acc, el| join(&acc, &observe_value(el)));
    let arr = ArrC { item: Box::new(item), samples: 1, empty: u64::from(xs.is_empty()) };
    U { arr: Some(arr), ..U::default() }
}

fn observe_object(map: &Map<String, Json>) -> U {
    let fields = map
        .iter()
        .map(|(k, v)| {
            let field = FieldC {
                ty: observe_value(v),
                present_in: 1,
                non_null_in: u64::from(!v.is_null()),
            };
            (k.clone(), field)
        })
        .collect();
    U { obj: Some(ObjC { fields, seen_objects: 1 }), ..U::default() }
}

// -------------------------------- Join (⊔) -------------------------------- //

fn join_opt<T: Clone>(a: &Option<T>, b: &Option<T>, f: impl Fn(&T, &T) -> T) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(f(x, y)),
    }
}

pub fn join(a: &U, b: &U) -> U {
    U {
        nullable: a.nullable || b.nullable,
        has_bool: a.has_bool || b.has_bool,
        num: join_opt(&a.num, &b.num, NumC::join),
        str_: join_opt(&a.str_, &b.str_, str::join_str),
        arr: join_opt(&a.arr, &b.arr, join_arr),
        obj: join_opt(&a.obj, &b.obj, join_obj),
    }
}

fn join_arr(a: &ArrC, b: &ArrC) -> ArrC {
    ArrC {
        item: Box::new(join(&a.item, &b.item)),
        samples: a.samples + b.samples,
        empty: a.empty + b.empty,
    }
}

fn join_obj(a: &ObjC, b: &ObjC) -> ObjC {
    let mut fields = a.fields.clone();
    for (k, fb) in &b.fields {
        match fields.get_mut(k) {
            Some(fa) => {
                fa.ty = join(&fa.ty, &fb.ty);
                fa.present_in += fb.present_in;
                fa.non_null_in += fb.non_null_in;
            }
            None => {
                fields.insert(k.clone(), fb.clone());
            }
        }
    }
    ObjC { fields, seen_objects: a.seen_objects + b.seen_objects }
}

// ------------------------------- Normalize -------------------------------- //

/// Settle per-kind decisions in place. Idempotent.
pub fn normalize(u: &mut U) {
    if let Some(str_c) = &mut u.str_ {
        let tiny = !str_c.overflow
            && str_c.lits.len() <= STRING_ENUM_MAX
            // every literal seen at least twice on average, so a handful of
            // distinct free-text values does not become an enum
            && str_c.seen >= 2 * str_c.lits.len() as u64
            && str_c.lits.iter().all(|s| str::looks_humanish(s));
        str_c.is_enum = tiny;
    }
    if let Some(arr) = &mut u.arr {
        normalize(&mut arr.item);
    }
    if let Some(obj) = &mut u.obj {
        for f in obj.fields.values_mut() {
            normalize(&mut f.ty);
        }
    }
}

// ------------------------------- Front API -------------------------------- //

/// Incremental inference over a stream of samples.
#[derive(Clone, Debug, Default)]
pub struct Inference {
    state: U,
    samples: u64,
}

impl Inference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_value(&mut self, v: &Json) {
        self.state = join(&self.state, &observe_value(v));
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn solve(&self) -> U {
        let mut u = self.state.clone();
        normalize(&mut u);
        u
    }

    pub fn schema(&self) -> crate::Schema {
        crate::lower::lower_to_schema(&self.solve())
    }
}

pub fn infer_from_values<'a, I>(values: I) -> U
where
    I: IntoIterator<Item = &'a Json>,
{
    let mut st = values.into_iter().fold(U::empty(), |acc, v| join(&acc, &observe_value(v)));
    normalize(&mut st);
    st
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integers_stay_integral() {
        let u = infer_from_values([&json!(1), &json!(5)]);
        let num = u.num.unwrap();
        assert!(num.integral());
        assert_eq!((num.min_f64.0, num.max_f64.0), (1.0, 5.0));
        let u = infer_from_values([&json!(1), &json!(2.5)]);
        assert!(!u.num.unwrap().integral());
    }

    #[test]
    fn repeated_human_strings_become_an_enum() {
        let samples = [json!("on"), json!("off"), json!("on"), json!("off")];
        let u = infer_from_values(samples.iter());
        let str_c = u.str_.unwrap();
        assert!(str_c.is_enum);
        assert_eq!(str_c.lits.len(), 2);

        let u = infer_from_values([&json!("Alice"), &json!("Bob")]);
        assert!(!u.str_.unwrap().is_enum);
    }

    #[test]
    fn objects_track_presence_and_nulls() {
        let a = json!({"x": 1, "y": "a"});
        let b = json!({"x": 2, "y": null, "z": true});
        let u = infer_from_values([&a, &b]);
        let obj = u.obj.unwrap();
        assert_eq!(obj.seen_objects, 2);
        assert_eq!(obj.fields["x"].non_null_in, 2);
        assert_eq!(obj.fields["y"].present_in, 2);
        assert_eq!(obj.fields["y"].non_null_in, 1);
        assert!(obj.fields["y"].ty.nullable);
        assert_eq!(obj.fields["z"].present_in, 1);
    }

    #[test]
    fn join_laws_commutative_associative() {
        let ua = observe_value(&json!({"a": [1, "x"], "d": "2024-01-01T00:00:00Z"}));
        let ub = observe_value(&json!({"a": [], "b": null}));
        let uc = observe_value(&json!([true, 2.5]));

        assert_eq!(join(&ua, &ub), join(&ub, &ua));
        assert_eq!(join(&join(&ua, &ub), &uc), join(&ua, &join(&ub, &uc)));
    }

    #[test]
    fn kinds_are_reported_in_priority_order() {
        let u = infer_from_values([&json!(true), &json!("s"), &json!({"a": 1})]);
        assert_eq!(u.kinds(), vec!["object", "string", "boolean"]);
        assert!(U::empty().is_bottom());
    }

    #[test]
    fn front_api_counts_samples() {
        let mut inf = Inference::new();
        inf.observe_value(&json!({"id": 1}));
        inf.observe_value(&json!({"id": 2}));
        assert_eq!(inf.samples(), 2);
        assert_eq!(inf.solve().obj.unwrap().fields["id"].present_in, 2);
    }
}
