use ordered_float::OrderedFloat;
use serde_json::Number;

#[derive(Clone, Debug, PartialEq)]
pub struct NumC {
    pub min_f64: OrderedFloat<f64>,
    pub max_f64: OrderedFloat<f64>,
    pub saw_int: bool,
    pub saw_float: bool,
}

impl Default for NumC {
    fn default() -> Self {
        Self {
            min_f64: OrderedFloat(f64::INFINITY),
            max_f64: OrderedFloat(f64::NEG_INFINITY),
            saw_int: false,
            saw_float: false,
        }
    }
}

impl NumC {
    pub(super) fn observe(n: &Number) -> Self {
        let is_int = n.is_i64() || n.is_u64();
        let f = OrderedFloat(n.as_f64().unwrap_or_default());
        Self { min_f64: f, max_f64: f, saw_int: is_int, saw_float: !is_int }
    }

    pub(super) fn join(a: &Self, b: &Self) -> Self {
        Self {
            min_f64: a.min_f64.min(b.min_f64),
            max_f64: a.max_f64.max(b.max_f64),
            saw_int: a.saw_int || b.saw_int,
            saw_float: a.saw_float || b.saw_float,
        }
    }

    /// Every observed number was written as an integer.
    pub fn integral(&self) -> bool {
        self.saw_int && !self.saw_float
    }
}
