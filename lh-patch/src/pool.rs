use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::error::{PatchError, PatchResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Bool(value) => write!(f, "{value}"),
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value:?}"),
            Constant::Str(value) => write!(f, "{value:?}"),
        }
    }
}

pub trait PoolEntry: Clone {
    fn same_entry(&self, other: &Self) -> bool;
}

impl PoolEntry for Constant {
    fn same_entry(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl PoolEntry for String {
    fn same_entry(&self, other: &Self) -> bool {
        self == other
    }
}

pub fn find_entry<T: PoolEntry>(pool: &[T], item: &T) -> Option<u32> {
    pool.iter()
        .position(|existing| existing.same_entry(item))
        .map(|index| index as u32)
}

#[derive(Clone, Debug)]
pub struct MergePlan<T> {
    indices: Vec<u32>,
    appended: Vec<T>,
}

impl<T: PoolEntry> MergePlan<T> {
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn appended(&self) -> &[T] {
        &self.appended
    }

    pub fn is_noop(&self) -> bool {
        self.appended.is_empty()
    }

    /// Does every fallible step without touching the pool's contents.
    pub fn stage(self, pool: &mut Arc<Vec<T>>) -> PatchResult<StagedPool<T>> {
        if self.appended.is_empty() {
            return Ok(StagedPool::Unchanged);
        }
        if let Some(owned) = Arc::get_mut(pool) {
            owned.try_reserve(self.appended.len())?;
            trace!(
                "reserved {} pool slots in place (len={})",
                self.appended.len(),
                owned.len()
            );
            return Ok(StagedPool::InPlace(self.appended));
        }
        let mut copy = Vec::new();
        copy.try_reserve_exact(pool.len() + self.appended.len())?;
        copy.extend(pool.iter().cloned());
        copy.extend(self.appended);
        trace!(
            "pool shared by {} owners; staged a private copy of {} entries",
            Arc::strong_count(pool),
            copy.len()
        );
        Ok(StagedPool::Replace(Arc::new(copy)))
    }
}

#[derive(Debug)]
pub enum StagedPool<T> {
    Unchanged,
    InPlace(Vec<T>),
    Replace(Arc<Vec<T>>),
}

impl<T: Clone> StagedPool<T> {
    pub fn commit(self, pool: &mut Arc<Vec<T>>) {
        match self {
            StagedPool::Unchanged => {}
            StagedPool::InPlace(items) => Arc::make_mut(pool).extend(items),
            StagedPool::Replace(replacement) => *pool = replacement,
        }
    }
}

pub fn plan_merge<T: PoolEntry>(pool: &[T], requested: &[T]) -> MergePlan<T> {
    let mut indices = Vec::with_capacity(requested.len());
    let mut appended: Vec<T> = Vec::new();
    for item in requested {
        let index = match find_entry(pool, item) {
            Some(index) => index,
            None => match find_entry(&appended, item) {
                Some(pending) => pool.len() as u32 + pending,
                None => {
                    appended.push(item.clone());
                    (pool.len() + appended.len() - 1) as u32
                }
            },
        };
        indices.push(index);
    }
    MergePlan { indices, appended }
}

pub fn merge_into<T: PoolEntry>(pool: &mut Arc<Vec<T>>, requested: &[T]) -> PatchResult<Vec<u32>> {
    let plan = plan_merge(pool.as_slice(), requested);
    let indices = plan.indices.clone();
    let staged = plan.stage(pool)?;
    staged.commit(pool);
    Ok(indices)
}

pub(crate) fn constant_index(pool: &[Constant], index: u32) -> PatchResult<&Constant> {
    pool.get(index as usize).ok_or_else(|| {
        PatchError::consistency(format!(
            "constant index {index} is out of range for a pool of {}",
            pool.len()
        ))
    })
}
