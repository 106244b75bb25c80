//! Workspace-level integration tests exercising the decoder, executor,
//! memory controller and ELF loader together end-to-end. Dev-only:
//! nothing here is imported by any library crate.
