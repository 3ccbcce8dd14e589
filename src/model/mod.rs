// src/model/mod.rs

//! Registry data model
//!
//! A [`Package`] is one published (id, version) with its manifest metadata
//! and listing state. A [`PackageRegistration`] groups every version of one
//! id and is the unit the search synchronizer works on.

mod package;

pub use package::{
    Package, PackageDependency, PackageIdentity, PackageRegistration, PackageType, SemVerLevel,
};
