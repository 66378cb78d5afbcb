// Static tables only. Family tables are created at runtime and queried
// with raw SQL.

diesel::table! {
    observation_families (name) {
        name -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    run_records (run_at, fetcher) {
        run_id -> Text,
        run_at -> Text,
        cadence -> Text,
        fetcher -> Text,
        success -> Bool,
        error -> Nullable<Text>,
        error_kind -> Nullable<Text>,
    }
}

diesel::table! {
    performance_records (run_at, fetcher) {
        run_id -> Text,
        run_at -> Text,
        cadence -> Text,
        fetcher -> Text,
        elapsed_seconds -> Double,
    }
}

diesel::table! {
    history (date) {
        date -> Text,
        total_liquid -> Nullable<Double>,
        total_real_estate -> Nullable<Double>,
        total_retirement -> Nullable<Double>,
        total_investing -> Nullable<Double>,
        etfs -> Nullable<Double>,
        commodities -> Nullable<Double>,
        ira -> Nullable<Double>,
        pillar2 -> Nullable<Double>,
        total_no_homes -> Nullable<Double>,
        total -> Nullable<Double>,
    }
}

diesel::table! {
    real_estate_prices (date, name, site) {
        date -> Text,
        name -> Text,
        site -> Text,
        value -> Double,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    observation_families,
    run_records,
    performance_records,
    history,
    real_estate_prices,
);
