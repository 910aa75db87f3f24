use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::rc::Rc;

use serde_json::Value;

use super::{Child, InspectError, Shape, Inspect};

macro_rules! primitive {
    ($($ty:ty => $label:expr),* $(,)?) => {
        $(
            impl Inspect for $ty {
                fn type_label(&self) -> String {
                    $label.to_string()
                }

                fn inspect(&self) -> Result<Shape<'_>, InspectError> {
                    Ok(Shape::Primitive(self.to_string()))
                }
            }
        )*
    };
}

primitive! {
    i8 => "sbyte", i16 => "short", i32 => "int", i64 => "long", isize => "long",
    u8 => "byte", u16 => "ushort", u32 => "uint", u64 => "ulong", usize => "ulong",
    f32 => "float", f64 => "double", bool => "bool", char => "char",
    str => "string", String => "string",
}

impl<T: Inspect + ?Sized> Inspect for &T {
    fn type_label(&self) -> String {
        (**self).type_label()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Box<T> {
    fn type_label(&self) -> String {
        (**self).type_label()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Rc<T> {
    fn type_label(&self) -> String {
        (**self).type_label()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        (**self).inspect()
    }
}

fn erase<'x, 's, T: Inspect + 's>(value: &'x T) -> &'x (dyn Inspect + 's) {
    value
}

/// A cell that is mutably borrowed while being dumped shows up as an error
/// leaf instead of panicking.
impl<T: Inspect> Inspect for RefCell<T> {
    fn type_label(&self) -> String {
        match self.try_borrow() {
            Ok(v) => v.type_label(),
            Err(_) => "RefCell".into(),
        }
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        let guard = self
            .try_borrow()
            .map_err(|e| InspectError(format!("value is being modified: {}", e)))?;
        Ok(Shape::Inner(Child::Cell(Ref::map(guard, erase))))
    }
}

impl<T: Inspect> Inspect for Option<T> {
    fn type_label(&self) -> String {
        match self {
            Some(v) => v.type_label(),
            None => "null".into(),
        }
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(match self {
            Some(v) => Shape::Inner(Child::Borrowed(v)),
            None => Shape::Primitive("null".into()),
        })
    }
}

impl<T: Inspect> Inspect for [T] {
    fn type_label(&self) -> String {
        "list".into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(Shape::Items(Box::new(
            self.iter().map(|v| Ok(Child::Borrowed(v as &dyn Inspect))),
        )))
    }
}

impl<T: Inspect> Inspect for Vec<T> {
    fn type_label(&self) -> String {
        "list".into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        self.as_slice().inspect()
    }
}

/// One entry of a map, dumped as `{Key, Value}`.
struct Entry<'a> {
    key: String,
    value: &'a dyn Inspect,
}

impl Inspect for Entry<'_> {
    fn type_label(&self) -> String {
        "KeyValuePair".into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(Shape::Members(vec![
            ("Key".into(), Ok(Child::Owned(Box::new(self.key.clone())))),
            ("Value".into(), Ok(Child::Borrowed(self.value))),
        ]))
    }
}

fn map_items<'a, K, V, I>(entries: I) -> Shape<'a>
where
    K: Display + 'a,
    V: Inspect + 'a,
    I: Iterator<Item = (&'a K, &'a V)> + 'a,
{
    Shape::Items(Box::new(entries.map(|(k, v)| {
        Ok(Child::Owned(Box::new(Entry { key: k.to_string(), value: v })))
    })))
}

impl<K: Display, V: Inspect> Inspect for HashMap<K, V> {
    fn type_label(&self) -> String {
        "dictionary".into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(map_items(self.iter()))
    }
}

impl<K: Display, V: Inspect> Inspect for BTreeMap<K, V> {
    fn type_label(&self) -> String {
        "dictionary".into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(map_items(self.iter()))
    }
}

impl Inspect for Value {
    fn type_label(&self) -> String {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "object",
        }
        .into()
    }

    fn inspect(&self) -> Result<Shape<'_>, InspectError> {
        Ok(match self {
            Value::Null => Shape::Primitive("null".into()),
            Value::Bool(b) => Shape::Primitive(b.to_string()),
            Value::Number(n) => Shape::Primitive(n.to_string()),
            Value::String(s) => Shape::Primitive(s.clone()),
            Value::Array(items) => {
                Shape::Items(Box::new(items.iter().map(|v| Ok(Child::Borrowed(v as &dyn Inspect)))))
            }
            Value::Object(map) => Shape::Members(
                map.iter()
                    .map(|(k, v)| (k.clone(), Ok(Child::Borrowed(v as &dyn Inspect))))
                    .collect(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{dump, DumpNode};
    use super::*;

    #[test]
    fn wrappers_are_transparent() {
        assert_eq!(dump(&Some(5), 1, 10), DumpNode::primitive("5"));
        assert_eq!(dump(&None::<i32>, 1, 10), DumpNode::primitive("null"));
        assert_eq!(dump(&Rc::new(RefCell::new("x")), 1, 10), DumpNode::primitive("x"));
    }

    #[test]
    fn mutably_borrowed_cell_becomes_error_leaf() {
        let cell = RefCell::new(vec![1, 2]);
        let outer = vec![Rc::new(RefCell::new(0)), Rc::new(RefCell::new(1))];
        let _guard = outer[1].borrow_mut();
        let out = dump(&outer, 2, 10);
        let DumpNode::Composite { children, .. } = out else { panic!("expected composite") };
        assert_eq!(children[0], DumpNode::primitive("0"));
        assert!(matches!(children[1], DumpNode::Error { .. }));

        // sibling cells are unaffected
        assert_eq!(dump(&cell, 1, 10).depth(), 1);
    }

    #[test]
    fn map_entries_are_capped_like_lists() {
        let map: BTreeMap<String, i32> = (0..5).map(|i| (format!("k{}", i), i)).collect();
        let out = dump(&map, 2, 2);
        let DumpNode::Composite { label, children } = out else { panic!("expected composite") };
        assert_eq!(label, "dictionary");
        assert_eq!(children.len(), 3);
        assert_eq!(children[2], DumpNode::Truncated { remaining: 3 });
        assert_eq!(
            children[0],
            DumpNode::composite(
                "KeyValuePair",
                vec![
                    DumpNode::member("Key", DumpNode::primitive("k0")),
                    DumpNode::member("Value", DumpNode::primitive("0")),
                ]
            )
        );
    }

    #[test]
    fn json_values_dump_structurally() {
        let v = serde_json::json!({"name": "pad", "tags": [1, 2]});
        let out = dump(&v, 3, 10);
        assert_eq!(
            out,
            DumpNode::composite(
                "object",
                vec![
                    DumpNode::member("name", DumpNode::primitive("pad")),
                    DumpNode::member(
                        "tags",
                        DumpNode::composite("list", vec![DumpNode::primitive("1"), DumpNode::primitive("2")])
                    ),
                ]
            )
        );
    }
}
