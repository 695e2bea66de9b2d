//! # Crawling Module
//!
//! The batch orchestration and recovery engine:
//! - 작업 분할 (partitioner)
//! - 세션 수명 주기와 로그인 (session_manager)
//! - 검색 결과 분류와 상품 정보 수집 (outcome_classifier, product_extractor)
//! - 항목 단위 복구 (recovery_controller)
//! - 배치 실행과 전체 실행 관리 (batch_executor, orchestrator)

pub mod batch_executor;
pub mod locators;
pub mod orchestrator;
pub mod outcome_classifier;
pub mod partitioner;
pub mod product_extractor;
pub mod recovery_controller;
pub mod session_manager;

pub use batch_executor::{BatchReport, run_batch};
pub use orchestrator::{Orchestrator, RunSummary};
pub use outcome_classifier::{OutcomeClassifier, PageState};
pub use partitioner::{Batch, WorkPlan, load_identifiers, partition};
pub use product_extractor::ProductExtractor;
pub use recovery_controller::{ItemReport, RecoveryController};
pub use session_manager::{ManagedSession, SessionManager, SessionState};
