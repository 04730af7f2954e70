//! Dual-bank register allocator: typed + boxed register banks, scope
//! frames, and span reservations.

use alloc::vec::Vec;

use crate::consts::{
    MP_SCOPE_LEVEL_COUNT,
    TEMP_REG_COUNT,
    TEMP_REG_START,
};
use crate::error::{
    simple_err,
    ErrorKind,
    SimpleResult,
};

/// A register bank. Typed banks host vector-like spans of one primitive
/// kind; `BoxedFrame`/`BoxedString` back general-purpose boxed registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    I32,
    I64,
    U32,
    U64,
    F64,
    BoolFrame,
    StringFrame,
}

pub const ALL_BANKS: [Bank; 7] = [
    Bank::I32,
    Bank::I64,
    Bank::U32,
    Bank::U64,
    Bank::F64,
    Bank::BoolFrame,
    Bank::StringFrame,
];

fn bank_index(bank: Bank) -> usize {
    ALL_BANKS.iter().position(|b| *b == bank).expect("exhaustive Bank list")
}

/// Width, in flat register ids, given to each bank within the temporary
/// region. `alloc_typed`/`begin_typed_span` number ids
/// per-bank starting at zero (the testable "bank independence" property);
/// [`RegisterAllocator::flat_register`] folds a bank-local id into the
/// single flat address space the bytecode's `u8 reg` operands index.
const BANK_WIDTH: usize = TEMP_REG_COUNT / ALL_BANKS.len();

fn bank_exhausted<T>(bank: Bank) -> SimpleResult<T> {
    simple_err(
        ErrorKind::Compile,
        alloc::format!(
            "register bank {:?} exhausted its {} reserved temporary slots",
            bank,
            BANK_WIDTH
        ),
    )
}

/// A single physical register id returned by [`RegisterAllocator::alloc_typed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub bank: Bank,
    pub physical_id: usize,
}

/// A contiguous window reserved within one bank for vector-like usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedSpanReservation {
    pub bank: Bank,
    pub physical_start: usize,
    pub length: usize,
    pub needs_reconciliation: bool,
}

/// Per-bank free-list, implemented as a bit-set over physical ids plus a
/// high-water mark so spans can be found without scanning from zero each
/// time.
#[derive(Debug, Default)]
struct BankState {
    free: Vec<usize>,
    next_fresh: usize,
}

impl BankState {
    /// Allocates the lowest free id, refusing to grow `next_fresh` past
    /// `capacity`. A freed id below `capacity` is always reusable even once
    /// the bank has hit capacity once.
    fn alloc_one(&mut self, capacity: usize) -> Option<usize> {
        if let Some(id) = self.take_lowest_free() {
            return Some(id);
        }
        if self.next_fresh >= capacity {
            return None;
        }
        let id = self.next_fresh;
        self.next_fresh += 1;
        Some(id)
    }

    fn take_lowest_free(&mut self) -> Option<usize> {
        if self.free.is_empty() {
            return None;
        }
        let (idx, _) = self
            .free
            .iter()
            .enumerate()
            .min_by_key(|(_, &id)| id)
            .expect("non-empty");
        Some(self.free.remove(idx))
    }

    fn free_one(&mut self, id: usize) {
        self.free.push(id);
    }

    /// Finds the lowest contiguous window of `length` ids, preferring ids
    /// already freed over growing the bank (best-fit-lowest-start). Returns
    /// `None` if no such window fits below `capacity`.
    fn find_window(&self, length: usize, capacity: usize) -> Option<usize> {
        if length == 0 {
            return Some(self.next_fresh.min(capacity));
        }
        let mut occupied: Vec<usize> = (0..self.next_fresh)
            .filter(|id| !self.free.contains(id))
            .collect();
        occupied.sort_unstable();
        let mut candidate = 0usize;
        for &id in &occupied {
            if id >= candidate + length {
                break;
            }
            candidate = id + 1;
        }
        if candidate + length > capacity {
            return None;
        }
        Some(candidate)
    }
}

/// A scope level, tracked only for overflow/underflow diagnostics; the
/// allocator does not otherwise interpret scope contents.
#[derive(Debug, Default)]
struct ScopeLevel;

/// The dual-bank register allocator.
#[derive(Debug)]
pub struct RegisterAllocator {
    banks: [BankState; 7],
    scopes: Vec<ScopeLevel>,
    pending_reconciliation: Vec<TypedSpanReservation>,
    max_scope_level_count: usize,

    pub scope_depth_overflow_count: u64,
    pub scope_exit_underflow_count: u64,
    pub max_scope_depth_seen: usize,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self {
            banks: core::array::from_fn(|_| BankState::default()),
            scopes: Vec::new(),
            pending_reconciliation: Vec::new(),
            max_scope_level_count: MP_SCOPE_LEVEL_COUNT,
            scope_depth_overflow_count: 0,
            scope_exit_underflow_count: 0,
            max_scope_depth_seen: 0,
        }
    }

    pub fn with_scope_level_count(mut self, max_scope_level_count: usize) -> Self {
        self.max_scope_level_count = max_scope_level_count;
        self
    }

    /// Allocates the lowest free physical id within `bank`. Fails once the
    /// bank has `BANK_WIDTH` ids live at once, rather than silently handing
    /// out an id that would alias into the next bank's region.
    pub fn alloc_typed(&mut self, bank: Bank) -> SimpleResult<Allocation> {
        let Some(physical_id) = self.banks[bank_index(bank)].alloc_one(BANK_WIDTH) else {
            return bank_exhausted(bank);
        };
        Ok(Allocation { bank, physical_id })
    }

    /// Returns `allocation`'s id to its bank's free set. A subsequent
    /// `alloc_typed` on the same bank returns this id.
    pub fn free(&mut self, allocation: Allocation) {
        self.banks[bank_index(allocation.bank)].free_one(allocation.physical_id);
    }

    /// Reserves `length` contiguous ids within `bank`. Fails if no window of
    /// that length fits within the bank's `BANK_WIDTH` reserved slots.
    pub fn begin_typed_span(
        &mut self,
        bank: Bank,
        length: usize,
        needs_reconciliation: bool,
    ) -> SimpleResult<TypedSpanReservation> {
        let state = &mut self.banks[bank_index(bank)];
        let Some(start) = state.find_window(length, BANK_WIDTH) else {
            return bank_exhausted(bank);
        };
        for id in start..start + length {
            if id >= state.next_fresh {
                state.next_fresh = id + 1;
            } else {
                state.free.retain(|&f| f != id);
            }
        }
        Ok(TypedSpanReservation {
            bank,
            physical_start: start,
            length,
            needs_reconciliation,
        })
    }

    /// Returns a reserved span to the free-set, queuing it for
    /// reconciliation if it was dirty.
    pub fn release_typed_span(&mut self, reservation: TypedSpanReservation) {
        let state = &mut self.banks[bank_index(reservation.bank)];
        for id in reservation.physical_start..reservation.physical_start + reservation.length {
            state.free_one(id);
        }
        if reservation.needs_reconciliation {
            self.pending_reconciliation.push(reservation);
        }
    }

    /// Drains the FIFO of released spans still awaiting a reconciliation
    /// instruction from the compiler.
    pub fn collect_pending_reconciliations(&mut self, out: &mut Vec<TypedSpanReservation>) {
        out.append(&mut self.pending_reconciliation);
    }

    pub fn enter_scope(&mut self) {
        if self.scopes.len() >= self.max_scope_level_count {
            self.scope_depth_overflow_count += 1;
            tracing::debug!(
                count = self.scope_depth_overflow_count,
                limit = self.max_scope_level_count,
                "scope depth overflow"
            );
            return;
        }
        self.scopes.push(ScopeLevel::default());
        self.max_scope_depth_seen = self.max_scope_depth_seen.max(self.scopes.len());
    }

    pub fn exit_scope(&mut self) {
        if self.scopes.pop().is_none() {
            self.scope_exit_underflow_count += 1;
            tracing::debug!(count = self.scope_exit_underflow_count, "scope exit underflow");
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Folds a bank-local allocation into the single flat register id the
    /// bytecode's `u8 reg` operands actually index.
    pub fn flat_register(&self, allocation: Allocation) -> u8 {
        let physical_id = allocation.physical_id;
        debug_assert!(physical_id < BANK_WIDTH, "bank exceeded its reserved temp-region width");
        (TEMP_REG_START + bank_index(allocation.bank) * BANK_WIDTH + physical_id) as u8
    }

    /// The flat register id of the `offset`-th register in a reserved span.
    pub fn flat_span_register(&self, span: &TypedSpanReservation, offset: usize) -> u8 {
        debug_assert!(offset < span.length);
        let allocation = Allocation {
            bank: span.bank,
            physical_id: span.physical_start + offset,
        };
        self.flat_register(allocation)
    }
}
