use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pagoda::{
    engine::{
        actions::ActionKind,
        backtest::{BacktestArgs, BacktestEngine},
    },
    error::PagodaError,
    risk::{RiskConfig, RiskVeto},
    scheduler::callback,
    strategy::Strategy,
};
use pagoda_data::{
    action::{ActionSecurityType, CorporateAction},
    request::Frequency,
    stub::StubProvider,
};
use pagoda_execution::{order::OrderStatus, pricing::Slippage};
use pagoda_instrument::{Side, security::Security};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, sync::Arc};

fn security() -> Security {
    Security::parse("000001.XSHE").unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn june_days() -> Vec<NaiveDate> {
    // Ten consecutive trade days in June 2024
    [3, 4, 5, 6, 7, 10, 11, 12, 13, 14]
        .into_iter()
        .map(|d| date(2024, 6, d))
        .collect()
}

fn flat_provider(days: Vec<NaiveDate>, price: Decimal) -> Arc<StubProvider> {
    Arc::new(StubProvider::new(days).with_flat_series(&security(), price))
}

fn args(days: &[NaiveDate], frequency: Frequency) -> BacktestArgs {
    BacktestArgs {
        start_date: days[0],
        end_date: *days.last().unwrap(),
        capital_base: dec!(100000),
        frequency,
        benchmark: None,
    }
}

#[tokio::test]
async fn test_buy_and_hold_costs_only_fees() {
    let days = june_days();
    let provider = flat_provider(days.clone(), dec!(100));

    let strategy = Strategy::new()
        .with_initialize(|ctx| ctx.set_slippage(Slippage::zero()))
        .with_handle_data(|ctx, _data| {
            if ctx.position_amount(&security()) == 0 {
                ctx.order(&security(), 100).unwrap();
            }
        });

    let mut engine = BacktestEngine::new(provider, strategy);
    let report = engine.run(args(&days, Frequency::Daily)).await.unwrap();

    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.side, Side::Buy);
    assert_eq!(trade.amount, 100);
    assert_eq!(trade.price, dec!(100));
    // max(5, 100 * 100 * 0.0003) = 5
    assert_eq!(trade.commission, dec!(5));

    assert_eq!(report.daily_records.len(), days.len());
    let last = report.daily_records.last().unwrap();
    assert_eq!(last.total_value, dec!(99995));
    assert_eq!(last.returns, dec!(99995) / dec!(100000) - Decimal::ONE);

    // Portfolio identity holds at every observation point
    for record in &report.daily_records {
        let position_value = record.total_value - record.cash;
        assert_eq!(position_value, dec!(10000), "day {}", record.date);
    }
}

#[tokio::test]
async fn test_daily_time_expressions_fire_at_expected_times() {
    let days = vec![date(2024, 6, 17)];
    let provider = flat_provider(days.clone(), dec!(100));

    let recorded: Arc<Mutex<HashMap<&'static str, Vec<NaiveDateTime>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let ordered: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));

    let recorded_outer = Arc::clone(&recorded);
    let ordered_outer = Arc::clone(&ordered);
    let record = move |tag: &'static str| {
        let recorded = Arc::clone(&recorded_outer);
        let ordered = Arc::clone(&ordered_outer);
        callback(move |ctx: pagoda::context::Context| {
            recorded.lock().entry(tag).or_default().push(ctx.current_dt());
            ordered.lock().push(ctx.current_dt());
        })
    };

    let handled: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));
    let handled_clone = Arc::clone(&handled);

    let expressions = [
        ("before_open", "open-30m"),
        ("open_minus_30s", "open-30s"),
        ("open", "open"),
        ("ten", "10:00:00"),
        ("mid_close", "11:30:00"),
        ("close_plus_30s", "close+30s"),
        ("close_plus_30m", "close+30m"),
        ("every_minute", "every_minute"),
    ];
    let strategy = Strategy::new()
        .with_initialize(move |ctx| {
            for (tag, expr) in expressions {
                ctx.run_daily(record(tag), expr).unwrap();
            }
        })
        .with_handle_data(move |ctx, _data| handled_clone.lock().push(ctx.current_dt()));

    let mut engine = BacktestEngine::new(provider, strategy);
    engine.run(args(&days, Frequency::Daily)).await.unwrap();

    let recorded = recorded.lock();
    let first_time = |tag: &str| recorded[tag][0].time();
    assert_eq!(first_time("before_open"), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    assert_eq!(
        first_time("open_minus_30s"),
        NaiveTime::from_hms_opt(9, 29, 30).unwrap()
    );
    assert_eq!(first_time("open"), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    assert_eq!(first_time("ten"), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(first_time("mid_close"), NaiveTime::from_hms_opt(11, 30, 0).unwrap());
    assert_eq!(
        first_time("close_plus_30s"),
        NaiveTime::from_hms_opt(15, 0, 30).unwrap()
    );
    assert_eq!(
        first_time("close_plus_30m"),
        NaiveTime::from_hms_opt(15, 30, 0).unwrap()
    );

    let minutes = &recorded["every_minute"];
    assert_eq!(minutes.len(), 240);
    assert_eq!(minutes[0].time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    assert_eq!(
        minutes.last().unwrap().time(),
        NaiveTime::from_hms_opt(14, 59, 0).unwrap()
    );
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    let last_morning = minutes.iter().filter(|dt| dt.time() < noon).next_back().unwrap();
    assert_eq!(last_morning.time(), NaiveTime::from_hms_opt(11, 29, 0).unwrap());

    // Daily frequency runs handle_data once, at the open point
    let handled = handled.lock();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());

    // Monotone virtual clock across every dispatched callback
    let ordered = ordered.lock();
    assert!(ordered.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn test_weekly_and_monthly_scopes() {
    let days = vec![
        date(2024, 6, 12),
        date(2024, 6, 13),
        date(2024, 6, 14),
        date(2024, 6, 17),
    ];
    let provider = flat_provider(days.clone(), dec!(100));

    let weekly_hits: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));
    let monthly_hits: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));

    let (weekly_clone, monthly_clone) = (Arc::clone(&weekly_hits), Arc::clone(&monthly_hits));
    let strategy = Strategy::new().with_initialize(move |ctx| {
        let weekly = Arc::clone(&weekly_clone);
        ctx.run_weekly(
            callback(move |ctx: pagoda::context::Context| weekly.lock().push(ctx.current_dt())),
            2,
            "open-30m",
        )
        .unwrap();
        let monthly = Arc::clone(&monthly_clone);
        ctx.run_monthly(
            callback(move |ctx: pagoda::context::Context| monthly.lock().push(ctx.current_dt())),
            15,
            "close+1h",
        )
        .unwrap();
    });

    let mut engine = BacktestEngine::new(provider, strategy);
    engine.run(args(&days, Frequency::Daily)).await.unwrap();

    let weekly_dates: Vec<NaiveDate> = weekly_hits.lock().iter().map(|dt| dt.date()).collect();
    assert_eq!(weekly_dates, vec![date(2024, 6, 12)]);

    // The 15th was a Saturday; rolls to Monday the 17th at close+1h
    assert_eq!(
        *monthly_hits.lock(),
        vec![date(2024, 6, 17).and_hms_opt(16, 0, 0).unwrap()]
    );
}

#[tokio::test]
async fn test_t_plus_one_blocks_same_day_sell() {
    let days = vec![date(2024, 6, 12), date(2024, 6, 13)];
    let provider = flat_provider(days.clone(), dec!(10));

    let strategy = Strategy::new()
        .with_initialize(|ctx| ctx.set_slippage(Slippage::zero()))
        .with_handle_data(|ctx, _data| {
            let security = security();
            if ctx.position_amount(&security) == 0 && ctx.trades_snapshot().is_empty() {
                ctx.order(&security, 100).unwrap();
                // Bought this bar: nothing closeable yet, so this sell rounds to zero
                let same_day_sell = ctx.order(&security, -100).unwrap();
                assert!(same_day_sell.is_none());
            } else if ctx.closeable_amount(&security) > 0 {
                ctx.order(&security, -100).unwrap();
            }
        });

    let mut engine = BacktestEngine::new(provider, strategy);
    let report = engine.run(args(&days, Frequency::Daily)).await.unwrap();

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].side, Side::Buy);
    assert_eq!(report.trades[0].time.date(), date(2024, 6, 12));
    assert_eq!(report.trades[1].side, Side::Sell);
    assert_eq!(report.trades[1].time.date(), date(2024, 6, 13));
    assert!(report.final_portfolio.positions.is_empty());
}

#[tokio::test]
async fn test_dividend_deferred_while_halted() {
    // Ex-date on a halted day: the payout lands on the next unhalted trade day
    let fund = Security::parse("513100.XSHG").unwrap();
    let days = vec![date(2022, 1, 12), date(2022, 1, 13), date(2022, 1, 14)];
    let provider = Arc::new(
        StubProvider::new(days.clone())
            .with_flat_series(&fund, dec!(5))
            .with_halted_day(&fund, date(2022, 1, 13))
            .with_action(CorporateAction::new(
                fund.clone(),
                date(2022, 1, 13),
                1,
                dec!(0.5),
                Decimal::ONE,
                ActionSecurityType::Fund,
            )),
    );

    let fund_clone = fund.clone();
    let strategy = Strategy::new()
        .with_initialize(|ctx| ctx.set_slippage(Slippage::zero()))
        .with_handle_data(move |ctx, _data| {
            if ctx.position_amount(&fund_clone) == 0 && ctx.trades_snapshot().is_empty() {
                ctx.order(&fund_clone, 400).unwrap();
            }
        });

    let mut engine = BacktestEngine::new(provider, strategy);
    let mut run_args = args(&days, Frequency::Daily);
    run_args.capital_base = dec!(10000);
    let report = engine.run(run_args).await.unwrap();

    assert_eq!(report.action_records.len(), 1);
    let action = &report.action_records[0];
    assert_eq!(action.kind, ActionKind::CashDividend);
    assert_eq!(action.ex_date, date(2022, 1, 13));
    assert_eq!(action.applied_on, date(2022, 1, 14));
    assert_eq!(action.cash_in, dec!(200.00));

    // 10000 - 400 * 5 - 5 commission + 200 dividend in cash
    assert_eq!(report.final_portfolio.cash, dec!(8195));
}

#[tokio::test]
async fn test_order_on_halted_day_is_rejected_with_warning() {
    let days = vec![date(2024, 6, 12), date(2024, 6, 13)];
    let provider = Arc::new(
        StubProvider::new(days.clone())
            .with_flat_series(&security(), dec!(10))
            .with_halted_day(&security(), date(2024, 6, 13)),
    );

    let strategy = Strategy::new().with_handle_data(|ctx, _data| {
        if ctx.current_dt().date() == date(2024, 6, 13) {
            // Halted: rejected with a warning, not an error
            let submitted = ctx.order(&security(), 100).unwrap();
            assert!(submitted.is_some());
        }
    });

    let mut engine = BacktestEngine::new(provider, strategy);
    let report = engine.run(args(&days, Frequency::Daily)).await.unwrap();

    assert!(report.trades.is_empty());
    assert_eq!(report.orders.len(), 1);
    assert_eq!(report.orders[0].status, OrderStatus::Rejected);
}

#[tokio::test]
async fn test_risk_veto_rejects_and_counts() {
    let days = vec![date(2024, 6, 12)];
    let provider = flat_provider(days.clone(), dec!(100));

    let veto: Arc<Mutex<Option<PagodaError>>> = Arc::new(Mutex::new(None));
    let veto_clone = Arc::clone(&veto);
    let strategy = Strategy::new()
        .with_initialize(|ctx| {
            ctx.set_risk_config(RiskConfig {
                max_order_value: Some(dec!(5000)),
                ..RiskConfig::default()
            })
        })
        .with_handle_data(move |ctx, _data| {
            // 100 shares at 100 = 10000, over the 5000 per-order cap
            *veto_clone.lock() = ctx.order(&security(), 100).err();
        });

    let mut engine = BacktestEngine::new(provider, strategy);
    let report = engine.run(args(&days, Frequency::Daily)).await.unwrap();

    assert!(matches!(
        veto.lock().take(),
        Some(PagodaError::RiskVeto(RiskVeto::OrderValue { .. }))
    ));
    assert!(report.trades.is_empty());
    assert!(report.orders.is_empty());

    let ctx = engine.context();
    assert_eq!(ctx.risk_stats().rejected_orders, 1);
}

#[tokio::test]
async fn test_every_bar_follows_declared_frequency() {
    let days = vec![date(2024, 6, 12)];

    for (frequency, expected) in [(Frequency::Daily, 1usize), (Frequency::Minute, 240usize)] {
        let provider = flat_provider(days.clone(), dec!(100));
        let hits: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));

        let hits_clone = Arc::clone(&hits);
        let strategy = Strategy::new().with_initialize(move |ctx| {
            let hits = Arc::clone(&hits_clone);
            ctx.run_daily(
                callback(move |ctx: pagoda::context::Context| hits.lock().push(ctx.current_dt())),
                "every_bar",
            )
            .unwrap();
        });

        let mut engine = BacktestEngine::new(provider, strategy);
        engine.run(args(&days, frequency)).await.unwrap();

        let hits = hits.lock();
        assert_eq!(hits.len(), expected, "frequency {frequency:?}");
        assert_eq!(hits[0].time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }
}

#[tokio::test]
async fn test_minute_frequency_runs_handle_data_every_bar() {
    let days = vec![date(2024, 6, 12)];
    let provider = flat_provider(days.clone(), dec!(100));

    let bars: Arc<Mutex<Vec<NaiveDateTime>>> = Arc::new(Mutex::new(Vec::new()));
    let bars_clone = Arc::clone(&bars);
    let strategy = Strategy::new()
        .with_handle_data(move |ctx, _data| bars_clone.lock().push(ctx.current_dt()));

    let mut engine = BacktestEngine::new(provider, strategy);
    engine.run(args(&days, Frequency::Minute)).await.unwrap();

    let bars = bars.lock();
    assert_eq!(bars.len(), 240);
    assert_eq!(bars[0].time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    assert_eq!(
        bars.last().unwrap().time(),
        NaiveTime::from_hms_opt(14, 59, 0).unwrap()
    );
}

#[tokio::test]
async fn test_order_target_forms_diff_against_total_amount() {
    let days = vec![date(2024, 6, 12), date(2024, 6, 13)];
    let provider = flat_provider(days.clone(), dec!(10));

    let strategy = Strategy::new()
        .with_initialize(|ctx| ctx.set_slippage(Slippage::zero()))
        .with_handle_data(|ctx, _data| {
            let security = security();
            if ctx.current_dt().date() == date(2024, 6, 12) {
                // 5000 / 10 = 500 shares
                ctx.order_value(&security, dec!(5000)).unwrap();
            } else {
                // Already holding 500: target 300 sells the 200 difference
                ctx.order_target(&security, 300).unwrap();
            }
        });

    let mut engine = BacktestEngine::new(provider, strategy);
    let report = engine.run(args(&days, Frequency::Daily)).await.unwrap();

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].amount, 500);
    assert_eq!(report.trades[1].side, Side::Sell);
    assert_eq!(report.trades[1].amount, 200);
    assert_eq!(report.final_portfolio.total_amount(&security()), 300);
}
