pub mod covariance;
pub mod max_sharpe;
pub mod qp;

pub use covariance::{annualized_covariance, ledoit_wolf, simple_returns, CovarianceEstimate};
pub use max_sharpe::{
    clean_weights, portfolio_performance, sector_constraints, OptimizedPortfolio,
    OptimizerParameters, PortfolioConstraints, PortfolioOptimizer, PortfolioPerformance,
    SectorConstraint,
};
pub use qp::{AdmmSettings, QpSolution, QuadraticProgram};
