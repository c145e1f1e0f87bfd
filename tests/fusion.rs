use datafusion_ml::{
    fuse, Column, ColumnData, ColumnType, Dataset, FusionConfig, FusionError, TaskType, Value,
};

fn config() -> FusionConfig {
    FusionConfig {
        n_estimators: 15,
        cv_splits: 3,
        ..FusionConfig::default()
    }
}

fn survey_a() -> Dataset {
    Dataset::new(vec![
        Column::categorical("age_group", &["young", "old", "young", "old"]),
        Column::numeric("x", vec![1.0, 0.0, 1.0, 0.0]),
    ])
    .unwrap()
}

fn survey_b() -> Dataset {
    Dataset::new(vec![
        Column::categorical("age_group", &["old", "young", "old"]),
        Column::numeric("y", vec![10.5, 3.25, 11.0]),
    ])
    .unwrap()
}

/// Две таблицы побольше: общий числовой и категориальный признаки
fn households(n: usize, offset: usize) -> (Dataset, Dataset) {
    let income: Vec<f64> = (0..n).map(|i| 1000.0 + 150.0 * i as f64).collect();
    let regions: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "north" } else { "south" }).collect();
    let spend: Vec<f64> = income.iter().map(|v| v * 0.4 + 12.5).collect();
    let a = Dataset::new(vec![
        Column::numeric("income", income),
        Column::categorical("region", &regions),
        Column::numeric("spend", spend),
    ])
    .unwrap();

    let income_b: Vec<f64> = (0..n).map(|i| 1075.0 + 150.0 * (i + offset) as f64).collect();
    let regions_b: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "north" } else { "south" }).collect();
    let owns_car: Vec<bool> = income_b.iter().map(|v| *v > 2500.0).collect();
    let b = Dataset::new(vec![
        Column::numeric("income", income_b),
        Column::categorical("region", &regions_b),
        Column::boolean("owns_car", owns_car),
    ])
    .unwrap();

    (a, b)
}

#[test]
fn enriches_both_directions() {
    let result = fuse(&survey_a(), &survey_b(), &config()).unwrap();

    assert_eq!(result.overlap_features, vec!["age_group"]);
    assert_eq!(result.a_enriched.column_names(), vec!["age_group", "x", "y"]);
    assert_eq!(result.b_enriched.column_names(), vec!["age_group", "y", "x"]);
    assert_eq!(result.a_enriched.n_rows(), 4);
    assert_eq!(result.b_enriched.n_rows(), 3);
}

#[test]
fn disjoint_schemas_have_no_overlap() {
    let a = Dataset::new(vec![Column::numeric("p", vec![1.0, 2.0])]).unwrap();
    let b = Dataset::new(vec![Column::numeric("q", vec![1.0, 2.0])]).unwrap();

    assert_eq!(fuse(&a, &b, &config()).unwrap_err(), FusionError::NoOverlap);

    let explicit = config().with_overlap(["p"]);
    assert_eq!(fuse(&a, &b, &explicit).unwrap_err(), FusionError::NoOverlap);
}

#[test]
fn small_classification_target_skips_cv_but_trains() {
    let result = fuse(&survey_a(), &survey_b(), &config()).unwrap();

    let model = &result.models_a_to_b["x"];
    assert_eq!(model.task, TaskType::Classification);
    assert!(result.metrics_a_to_b["x"].is_empty());

    let x = &result.b_enriched.column("x").unwrap().data;
    assert_eq!(x.column_type(), ColumnType::Numeric);
    assert!((0..3).all(|i| matches!(x.get(i), Value::Number(v) if v == 0.0 || v == 1.0)));
}

#[test]
fn fused_is_sorted_union_of_rows() {
    let (a, b) = households(12, 3);
    let result = fuse(&a, &b, &config()).unwrap();

    assert_eq!(result.fused.n_rows(), 24);
    assert_eq!(
        result.fused.column_names(),
        vec!["income", "owns_car", "region", "spend"]
    );

    // Строки A идут первыми и сохраняют порядок
    let income = &result.fused.column("income").unwrap().data;
    assert_eq!(income.get(0), Value::Number(1000.0));
    assert_eq!(income.get(12), Value::Number(1075.0 + 450.0));

    assert_eq!(
        result.a_enriched.column("owns_car").unwrap().column_type(),
        ColumnType::Boolean
    );
    assert_eq!(
        result.b_enriched.column("spend").unwrap().column_type(),
        ColumnType::Numeric
    );
}

#[test]
fn larger_targets_report_metrics() {
    let (a, b) = households(15, 0);
    let result = fuse(&a, &b, &config()).unwrap();

    let spend = &result.metrics_a_to_b["spend"];
    assert!(spend.contains_key("rmse"));
    assert!(spend.values().all(|v| v.is_finite()));

    let owns_car = &result.metrics_b_to_a["owns_car"];
    assert!(owns_car.contains_key("accuracy"));
    assert!(owns_car.contains_key("f1_macro"));
}

#[test]
fn same_inputs_same_outputs() {
    let (a, b) = households(12, 2);
    let first = fuse(&a, &b, &config()).unwrap();
    let second = fuse(&a, &b, &config()).unwrap();

    assert_eq!(first.a_enriched, second.a_enriched);
    assert_eq!(first.b_enriched, second.b_enriched);
    assert_eq!(first.metrics_a_to_b, second.metrics_a_to_b);
    assert_eq!(first.metrics_b_to_a, second.metrics_b_to_a);
}

#[test]
fn sequential_and_parallel_runs_agree() {
    let (a, b) = households(12, 1);
    let parallel = fuse(&a, &b, &config()).unwrap();
    let sequential = fuse(
        &a,
        &b,
        &FusionConfig {
            parallel: false,
            ..config()
        },
    )
    .unwrap();

    assert_eq!(parallel.fused, sequential.fused);
    assert_eq!(parallel.metrics_a_to_b, sequential.metrics_a_to_b);
}

#[test]
fn dense_and_sparse_encodings_agree() {
    let (a, b) = households(10, 4);
    let sparse = fuse(&a, &b, &config()).unwrap();
    let dense = fuse(
        &a,
        &b,
        &FusionConfig {
            use_sparse_onehot: false,
            ..config()
        },
    )
    .unwrap();

    assert_eq!(sparse.fused, dense.fused);
}

#[test]
fn disjoint_category_vocabularies_still_encode() {
    let a = Dataset::new(vec![
        Column::categorical("city", &["paris", "lyon", "paris", "lyon"]),
        Column::numeric("score", vec![1.5, 2.5, 1.75, 2.25]),
    ])
    .unwrap();
    let b = Dataset::new(vec![
        Column::categorical("city", &["rome", "milan"]),
        Column::categorical("team", &["red", "blue"]),
    ])
    .unwrap();

    let result = fuse(&a, &b, &config()).unwrap();
    assert_eq!(result.b_enriched.column_names(), vec!["city", "team", "score"]);
    assert_eq!(result.a_enriched.column_names(), vec!["city", "score", "team"]);
    assert_eq!(result.models_a_to_b["score"].features.len(), 4);
}

#[test]
fn problem_type_override_wins() {
    let config = config().with_problem_type("x", TaskType::Regression);
    let result = fuse(&survey_a(), &survey_b(), &config).unwrap();

    assert_eq!(result.models_a_to_b["x"].task, TaskType::Regression);
    assert!(result.models_a_to_b["x"].classes.is_none());
}

#[test]
fn colliding_prediction_gets_suffix() {
    let a = survey_a();
    let b = Dataset::new(vec![
        Column::categorical("age_group", &["old", "young"]),
        Column::numeric("x", vec![5.0, 6.0]),
    ])
    .unwrap();
    let config = config()
        .with_overlap(["age_group"])
        .with_targets_from_a(["x"])
        .with_targets_from_b(Vec::<String>::new());

    let result = fuse(&a, &b, &config).unwrap();
    assert_eq!(result.b_enriched.column_names(), vec!["age_group", "x", "x_pred"]);
}

#[test]
fn prediction_name_taken_twice_gets_numbered_suffix() {
    let b = Dataset::new(vec![
        Column::categorical("age_group", &["old", "young"]),
        Column::numeric("x", vec![5.0, 6.0]),
        Column::numeric("x_pred", vec![7.0, 8.0]),
    ])
    .unwrap();
    let config = config()
        .with_overlap(["age_group"])
        .with_targets_from_a(["x"])
        .with_targets_from_b(Vec::<String>::new());

    let result = fuse(&survey_a(), &b, &config).unwrap();
    assert_eq!(
        result.b_enriched.column_names(),
        vec!["age_group", "x", "x_pred", "x_pred_2"]
    );
    assert_eq!(
        result.fused.column_names(),
        vec!["age_group", "x", "x_pred", "x_pred_2"]
    );
}

#[test]
fn target_without_values_is_skipped() {
    let a = Dataset::new(vec![
        Column::numeric("k", vec![1.0, 2.0, 3.0]),
        Column::new("empty", ColumnData::Numeric(vec![None, None, None])),
    ])
    .unwrap();
    let b = Dataset::new(vec![Column::numeric("k", vec![1.5, 2.5])]).unwrap();

    let result = fuse(&a, &b, &config()).unwrap();
    assert!(!result.models_a_to_b.contains_key("empty"));
    assert!(!result.metrics_a_to_b.contains_key("empty"));

    let empty = &result.b_enriched.column("empty").unwrap().data;
    assert!((0..2).all(|i| empty.is_null(i)));
}

#[test]
fn mixed_text_and_numeric_overlap_is_rejected() {
    let a = Dataset::new(vec![
        Column::numeric("k", vec![1.0, 2.0]),
        Column::numeric("t", vec![1.0, 2.0]),
    ])
    .unwrap();
    let b = Dataset::new(vec![Column::categorical("k", &["one", "two"])]).unwrap();

    let explicit = config().with_overlap(["k"]);
    assert!(matches!(
        fuse(&a, &b, &explicit),
        Err(FusionError::TypeMismatch { .. })
    ));
}
