//! Tagged-union (enum instance) constructor.

use alloc::vec::Vec;

use crate::{
    gc::{
        GcHeap,
        GcRef,
    },
    intern::StringInterner,
    value::{
        EnumInstance,
        HeapPayload,
        Value,
    },
};

/// Inputs to [`make_tagged_union`]: a payload pointer and an independent
/// payload count, so a caller claiming a nonzero count with no pointer is
/// representable (and rejected) rather than silently collapsed to "no
/// payload".
#[derive(Debug, Clone)]
pub struct TaggedUnionSpec<'a> {
    pub type_name: &'a str,
    pub variant_name: Option<&'a str>,
    pub variant_index: u32,
    pub payload_ptr: Option<&'a [Value]>,
    pub payload_count: usize,
}

/// Builds a tagged-union instance, surviving GC pressure across the two
/// allocations (the payload array, then the instance header) by pinning
/// each intermediate the moment it is created.
///
/// Returns `false` and leaves `out` untouched on malformed inputs: a
/// missing type name, or a nonzero payload length with no payload pointer.
pub fn make_tagged_union(
    heap: &mut GcHeap,
    interner: &mut StringInterner,
    spec: &TaggedUnionSpec<'_>,
    out: &mut Value,
) -> bool {
    if spec.type_name.is_empty() {
        return false;
    }
    if spec.payload_count > 0 && spec.payload_ptr.is_none() {
        return false;
    }

    let type_name = interner.intern(spec.type_name);
    let variant_name = spec.variant_name.map(|v| interner.intern(v));

    let payload_ref = match spec.payload_ptr {
        None => None,
        Some(values) if spec.payload_count == 0 => {
            debug_assert!(values.is_empty());
            None
        }
        Some(values) => {
            let array = HeapPayload::Array(values.to_vec());
            let payload_ref = heap.alloc(array, &[]);
            heap.pin(payload_ref);
            Some(payload_ref)
        }
    };

    let instance = EnumInstance {
        type_name,
        variant_name,
        variant_index: spec.variant_index,
        payload: payload_ref,
    };
    let extra_roots: Vec<GcRef> = payload_ref.into_iter().collect();
    let instance_ref = heap.alloc(HeapPayload::Enum(instance), &extra_roots);

    if let Some(payload_ref) = payload_ref {
        heap.unpin(payload_ref);
    }

    *out = Value::EnumRef(instance_ref);
    true
}

/// `result_ok(v)` is `make_tagged_union({"Result","Ok",0,[v]})`.
pub fn result_ok(
    heap: &mut GcHeap,
    interner: &mut StringInterner,
    value: Value,
    out: &mut Value,
) -> bool {
    let payload = [value];
    make_tagged_union(
        heap,
        interner,
        &TaggedUnionSpec {
            type_name: "Result",
            variant_name: Some("Ok"),
            variant_index: 0,
            payload_ptr: Some(&payload),
            payload_count: 1,
        },
        out,
    )
}

/// `result_err(v)` is `make_tagged_union({"Result","Err",1,[v]})`.
pub fn result_err(
    heap: &mut GcHeap,
    interner: &mut StringInterner,
    value: Value,
    out: &mut Value,
) -> bool {
    let payload = [value];
    make_tagged_union(
        heap,
        interner,
        &TaggedUnionSpec {
            type_name: "Result",
            variant_name: Some("Err"),
            variant_index: 1,
            payload_ptr: Some(&payload),
            payload_count: 1,
        },
        out,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_type_name_fails_and_leaves_output_untouched() {
        let mut heap = GcHeap::new(1 << 20);
        let mut interner = StringInterner::new();
        let mut out = Value::Bool(true);
        let ok = make_tagged_union(
            &mut heap,
            &mut interner,
            &TaggedUnionSpec {
                type_name: "",
                variant_name: None,
                variant_index: 0,
                payload_ptr: None,
                payload_count: 0,
            },
            &mut out,
        );
        assert!(!ok);
        assert_eq!(out, Value::Bool(true));
    }

    #[test]
    fn nonzero_payload_count_without_a_pointer_fails() {
        let mut heap = GcHeap::new(1 << 20);
        let mut interner = StringInterner::new();
        let mut out = Value::Bool(false);
        let ok = make_tagged_union(
            &mut heap,
            &mut interner,
            &TaggedUnionSpec {
                type_name: "Result",
                variant_name: Some("Ok"),
                variant_index: 0,
                payload_ptr: None,
                payload_count: 1,
            },
            &mut out,
        );
        assert!(!ok);
        assert_eq!(out, Value::Bool(false));
    }

    #[test]
    fn zero_length_payload_allocates_no_array() {
        let mut heap = GcHeap::new(1 << 20);
        let mut interner = StringInterner::new();
        let mut out = Value::Nil;
        let before = heap.bytes_allocated();
        let ok = make_tagged_union(
            &mut heap,
            &mut interner,
            &TaggedUnionSpec {
                type_name: "Unit",
                variant_name: None,
                variant_index: 0,
                payload_ptr: None,
                payload_count: 0,
            },
            &mut out,
        );
        assert!(ok);
        let Value::EnumRef(r) = out else { panic!("expected EnumRef") };
        let HeapPayload::Enum(instance) = heap.get(r) else { panic!("expected Enum") };
        assert!(instance.payload.is_none());
        // Only the instance header was allocated, not a payload array.
        assert!(heap.bytes_allocated() > before);
    }

    #[test]
    fn result_ok_survives_gc_pressure_from_a_threshold_of_one() {
        let mut heap = GcHeap::new(1);
        let mut interner = StringInterner::new();
        let mut out = Value::Nil;
        let ok = result_ok(&mut heap, &mut interner, Value::I32(42), &mut out);
        assert!(ok);

        let Value::EnumRef(r) = out else { panic!("expected EnumRef") };
        let HeapPayload::Enum(instance) = heap.get(r) else { panic!("expected Enum") };
        assert_eq!(interner.resolve(instance.type_name), "Result");
        assert_eq!(instance.variant_name.map(|v| interner.resolve(v)), Some("Ok"));
        assert_eq!(instance.variant_index, 0);

        let payload_ref = instance.payload.expect("payload present");
        let HeapPayload::Array(values) = heap.get(payload_ref) else { panic!("expected Array") };
        assert_eq!(values.as_slice(), &[Value::I32(42)]);
    }
}
