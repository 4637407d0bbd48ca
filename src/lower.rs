use tracing::warn;

use crate::inference::{ArrC, NumC, ObjC, StrC, U};
use crate::schema::{self, Schema};

/// Lower normalized evidence to a schema. Null evidence wraps the result in
/// `nullable`; evidence of several kinds keeps the highest-priority one.
pub fn lower_to_schema(u: &U) -> Schema {
    let base = lower_core(u);
    if u.nullable { schema::nullable(base) } else { base }
}

fn lower_core(u: &U) -> Schema {
    let kinds = u.kinds();
    if kinds.len() > 1 {
        warn!(kept = kinds[0], dropped = ?&kinds[1..], "samples mix JSON kinds; keeping one");
    }
    if let Some(obj) = &u.obj {
        return lower_object(obj);
    }
    if let Some(arr) = &u.arr {
        return lower_array(arr);
    }
    if let Some(str_c) = &u.str_ {
        return lower_string(str_c);
    }
    if let Some(num) = &u.num {
        return lower_number(num);
    }
    if u.has_bool {
        return schema::boolean();
    }
    // only nulls, or nothing at all
    schema::unknown()
}

fn lower_object(obj: &ObjC) -> Schema {
    let mut required = Vec::new();
    let mut partial = Vec::new();
    for (k, f) in &obj.fields {
        if f.non_null_in == obj.seen_objects {
            required.push((k.clone(), lower_to_schema(&f.ty)));
        } else {
            partial.push((k.clone(), lower_to_schema(&f.ty)));
        }
    }
    schema::both_struct(required, partial)
}

fn lower_array(arr: &ArrC) -> Schema {
    let item = lower_to_schema(&arr.item);
    // one sample proves nothing about emptiness
    if arr.samples >= 2 && arr.empty == 0 {
        schema::non_empty_array(item)
    } else {
        schema::array(item)
    }
}

fn lower_string(str_c: &StrC) -> Schema {
    if str_c.all_uuids {
        schema::uuid()
    } else if str_c.all_dates {
        schema::date()
    } else if str_c.is_enum && !str_c.lits.is_empty() {
        schema::one_of_literals(str_c.lits.iter().cloned())
    } else {
        schema::string()
    }
}

fn lower_number(num: &NumC) -> Schema {
    if num.integral() {
        schema::constrained(schema::number(), "Int", |v| v.as_f64().is_some_and(|n| n.fract() == 0.0))
    } else {
        schema::number()
    }
}
