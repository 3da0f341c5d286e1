// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types
//!
//! Only `Stale` is a recoverable, caller-visible result. Every other variant
//! is either a programmer error (registration conflicts, unassigned
//! components) that the caller is expected to treat as fatal, or a resource
//! condition (exhaustion, allocator failure, row overflow) that ends the
//! run. The core never retries.

use std::fmt;

use crate::component::ComponentId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Duplicate component or archetype id registration.
    RegistrationConflict(String),

    /// A query referenced a component id that was never registered.
    UnassignedComponent(ComponentId),

    /// Entity store has no free slots left.
    Exhausted,

    /// An archetype table's row cursor exceeded `maxRowsPerTable`.
    RowOverflow { archetype_id: u32, max_rows: usize },

    /// The reserve-commit allocator refused a reservation.
    AllocatorFailure(String),

    /// Entity handle resolved against a stale (already-freed) generation.
    Stale,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::RegistrationConflict(msg) => write!(f, "registration conflict: {msg}"),
            EcsError::UnassignedComponent(id) => {
                write!(f, "query referenced unregistered component {id}")
            }
            EcsError::Exhausted => write!(f, "entity store exhausted"),
            EcsError::RowOverflow {
                archetype_id,
                max_rows,
            } => write!(
                f,
                "archetype {archetype_id} exceeded maxRowsPerTable ({max_rows})"
            ),
            EcsError::AllocatorFailure(msg) => write!(f, "allocator failure: {msg}"),
            EcsError::Stale => write!(f, "stale entity handle"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
