/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of data types used across the library.

pub mod crypto_primitives;

pub mod data_types;

pub mod proposal;

pub mod validator_set;
