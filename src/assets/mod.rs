//! Downloads of product files found during crawls
//!
//! Committing a job registers every linked file of its products in the
//! `assets` table. [`AssetDownloader`] later fetches the registered files
//! into a per-profile folder and records the local path and content hash.

mod downloader;

pub use downloader::{asset_file_name, AssetDownloader, DownloadSummary};
