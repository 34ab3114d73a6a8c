// ─── InterfaceOficial Engine Core ───
// Task orchestration and a resilient download engine for game installs.
//
// Architecture:
//   core/
//     task/        — Cancellable tasks, the task registry, phased flows
//     downloader/  — Concurrent downloads with SHA-1 validation and retry
//     mirror/      — Official/mirror URL mapping + fallback dispatcher
//     pagination/  — Chunked fetching of paginated listings
//     version/     — Mojang manifest + version JSON + OS rules
//     assets/      — Asset index layout
//     maven/       — Artifact coordinates
//     install/     — Download planning + Minecraft downloader

pub mod assets;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod maven;
pub mod mirror;
pub mod pagination;
pub mod retry;
pub mod task;
pub mod version;
