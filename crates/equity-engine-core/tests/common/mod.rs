//! Synthetic market used by the integration tests.
#![allow(dead_code)]

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use equity_engine_core::data::{
    AssetHistory, BenchmarkObservation, DividendHistory, FundamentalsRecord, IndexComposition,
    MarketSnapshot, MultiplesObservation, RateOutlook, SectorClassification,
};
use equity_engine_core::series::AscendingSeries;

pub const RATE_HIKE_PROBABILITY: f64 = 0.3;
/// Neutral-segment rate penalty at a 30% hike probability.
pub const NEUTRAL_RATE_PENALTY: f64 = 1.067;
/// Rate-sensitive penalty at a 30% hike probability.
pub const SENSITIVE_RATE_PENALTY: f64 = 1.05;

pub struct AssetSpec {
    pub ticker: &'static str,
    pub segment: &'static str,
    pub growth: f64,
    pub price: f64,
    pub drift: f64,
    pub wave: f64,
}

pub static ASSETS: [AssetSpec; 8] = [
    AssetSpec { ticker: "ENGI3", segment: "Energia Elétrica", growth: 0.20, price: 40.0, drift: 0.10, wave: 0.07 },
    AssetSpec { ticker: "ENGI4", segment: "Energia Elétrica", growth: 0.22, price: 42.0, drift: 0.12, wave: 0.05 },
    AssetSpec { ticker: "TAEE11", segment: "Energia Elétrica", growth: 0.18, price: 35.0, drift: 0.08, wave: 0.11 },
    AssetSpec { ticker: "ITUB4", segment: "Bancos", growth: 0.16, price: 30.0, drift: 0.09, wave: 0.13 },
    AssetSpec { ticker: "PETR4", segment: "Petróleo, Gás e Biocombustíveis", growth: 0.25, price: 28.0, drift: 0.15, wave: 0.03 },
    AssetSpec { ticker: "LREN3", segment: "Tecidos, Vestuário e Calçados", growth: 0.14, price: 18.0, drift: 0.05, wave: 0.17 },
    AssetSpec { ticker: "WEAK3", segment: "Comércio Varejista", growth: 0.05, price: 12.0, drift: 0.02, wave: 0.19 },
    AssetSpec { ticker: "VALE3", segment: "Minerais Metálicos", growth: 0.21, price: 60.0, drift: 0.11, wave: 0.09 },
];

/// Tickers of the published index composition. VALE3 is left out on
/// purpose and ZZZZ3 has no data.
pub const INDEX: [&str; 8] = [
    "ENGI3", "ENGI4", "TAEE11", "ITUB4", "PETR4", "LREN3", "WEAK3", "ZZZZ3",
];

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn build_date() -> NaiveDate {
    d(2024, 2, 20)
}

pub fn business_days(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = from;
    while day <= to {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}

fn quarter_ends(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut month_start = d(first.year(), first.month(), 1);
    loop {
        let end = month_start.checked_add_months(Months::new(1)).unwrap() - Duration::days(1);
        if end > last {
            break;
        }
        out.push(end);
        month_start = month_start.checked_add_months(Months::new(3)).unwrap();
    }
    out
}

/// Quarterly balance sheets growing at `spec.growth` a year, disclosed
/// 45 days after each quarter.
pub fn fundamentals(spec: &AssetSpec, last_period: NaiveDate) -> Vec<FundamentalsRecord> {
    quarter_ends(d(2015, 3, 31), last_period)
        .into_iter()
        .enumerate()
        .map(|(q, period_end)| {
            let years = q as f64 / 4.0;
            let revenue = 1000.0 * (1.0 + spec.growth).powf(years);
            FundamentalsRecord {
                period_end,
                disclosed_on: period_end + Duration::days(45),
                revenue,
                ebitda: 0.25 * revenue,
                net_income: 0.15 * revenue,
                controlling_net_income: 0.15 * revenue,
                gross_debt: 0.5 * revenue,
                net_debt: 0.25 * revenue,
                lease_debt: 0.0,
                operating_cash_flow: 0.2 * revenue,
                investing_cash_flow: -0.1 * revenue,
                financing_cash_flow: -0.05 * revenue,
                shares_outstanding: 100.0,
                classification: SectorClassification {
                    sector: "Setor".into(),
                    subsector: "Subsetor".into(),
                    segment: spec.segment.into(),
                },
                close_price: spec.price,
                dividends: DividendHistory {
                    m12: 0.0003 * revenue,
                    m24: 0.0003 * revenue / (1.0 + spec.growth),
                    m36: 0.0003 * revenue / (1.0 + spec.growth).powi(2),
                    m48: 0.0,
                    m60: 0.0,
                },
            }
        })
        .collect()
}

/// Daily prices with a drift and a wave of asset-specific frequency.
pub fn multiples(spec: &AssetSpec, days: &[NaiveDate]) -> Vec<MultiplesObservation> {
    days.iter()
        .enumerate()
        .map(|(t, date)| {
            let t = t as f64;
            let price = spec.price
                * (spec.drift * t / 252.0).exp()
                * (1.0 + 0.04 * (t * spec.wave).sin() + 0.01 * (t * 0.7 * spec.wave + 1.3).cos());
            MultiplesObservation {
                date: *date,
                close: price,
                adjusted_close: price,
                enterprise_value: Some(price * 150.0),
                ev_sales: Some(2.0 + 0.2 * (t * spec.wave).sin()),
                ev_ebitda: Some(8.0 + 0.5 * (t * spec.wave).cos()),
                price_earnings: Some(12.0 + (t * spec.wave).sin()),
                net_margin: Some(0.15),
                ebitda_margin: Some(0.25),
                net_debt_ebitda: Some(1.0),
            }
        })
        .collect()
}

pub fn asset(spec: &AssetSpec, last_period: NaiveDate, last_price: NaiveDate) -> AssetHistory {
    AssetHistory {
        fundamentals: AscendingSeries::new(fundamentals(spec, last_period)),
        multiples: AscendingSeries::new(multiples(spec, &business_days(d(2019, 1, 1), last_price))),
        cagr: Vec::new(),
    }
}

/// Benchmark at a 10% annual rate with the LFTS3 column left for the
/// engine to synthesize.
pub fn benchmark(days: &[NaiveDate], annual_pct: f64) -> Vec<BenchmarkObservation> {
    let daily_pct = ((1.0 + annual_pct / 100.0).powf(1.0 / 252.0) - 1.0) * 100.0;
    days.iter()
        .enumerate()
        .map(|(t, date)| BenchmarkObservation {
            date: *date,
            annual_rate_pct: Some(annual_pct),
            daily_rate_pct: Some(daily_pct),
            index_level: Some(100_000.0 * (1.0 + 0.05 * (t as f64 * 0.05).sin()) * (0.08 * t as f64 / 252.0).exp()),
            risk_free_index: None,
        })
        .collect()
}

pub fn snapshot_with_rate(annual_pct: f64) -> MarketSnapshot {
    let last_price = build_date();
    let assets = ASSETS
        .iter()
        .map(|spec| (spec.ticker.to_string(), asset(spec, d(2023, 12, 31), last_price)))
        .collect();
    MarketSnapshot {
        assets,
        benchmark: AscendingSeries::new(benchmark(
            &business_days(d(2019, 1, 1), last_price),
            annual_pct,
        )),
        rate_outlook: AscendingSeries::new(vec![RateOutlook {
            date: d(2019, 1, 1),
            hike_probability: RATE_HIKE_PROBABILITY,
        }]),
        index_compositions: AscendingSeries::new(vec![IndexComposition {
            date: d(2023, 9, 1),
            tickers: INDEX.iter().map(|t| t.to_string()).collect(),
        }]),
    }
    .with_synthetic_risk_free()
}

pub fn snapshot() -> MarketSnapshot {
    snapshot_with_rate(10.0)
}

pub fn spec(ticker: &str) -> &'static AssetSpec {
    ASSETS.iter().find(|a| a.ticker == ticker).unwrap()
}
