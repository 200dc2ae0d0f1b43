// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-attempt query functions, one module per table group.

pub mod messages;
pub mod queue;
pub mod users;
