use std::cell::RefCell;
use std::rc::Rc;

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;

use functab::array::ChangeAction;
use functab::binding::{BindingError, FunctionBindingList, ListChange};
use functab::function::{Function, VariableRole};
use functab::value::Value;
use functab::variable::Variable;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sorted_series() -> (Rc<Function>, FunctionBindingList) {
    init_logging();
    let function = Function::new("y(x)");
    let x = Rc::new(Variable::<i32>::new("x"));
    x.set_auto_sorted(true).unwrap();
    function.add_argument(x).unwrap();
    function
        .add_component(Rc::new(Variable::<i32>::new("y")))
        .unwrap();
    let list = FunctionBindingList::new(Rc::clone(&function));
    (function, list)
}

fn record_changes(list: &FunctionBindingList) -> Rc<RefCell<Vec<ListChange>>> {
    let seen: Rc<RefCell<Vec<ListChange>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    list.subscribe(move |change| sink.borrow_mut().push(change.clone()));
    seen
}

#[test]
fn test_grid_editing_round_trip() {
    let (function, list) = sorted_series();
    for x in [1, 5, 10, 15] {
        function.add_argument_value(0, Value::Int(x)).unwrap();
    }
    for (i, y) in [1, 5, 10, 15].iter().enumerate() {
        function.set_component_value(0, &[i], Value::Int(*y)).unwrap();
    }
    assert_eq!(list.row_count(), 4);

    // Editing y at x=5 notifies exactly the one affected row.
    let seen = record_changes(&list);
    list.set_cell(1, 1, Value::Int(99)).unwrap();
    assert_eq!(*seen.borrow(), vec![ListChange::ItemChanged(1)]);
    assert_eq!(function.component_value(0, &[1]).unwrap(), Value::Int(99));

    // An external add lands at the sorted position and shifts the rows.
    seen.borrow_mut().clear();
    function.add_argument_value(0, Value::Int(3)).unwrap();
    assert_eq!(*seen.borrow(), vec![ListChange::ItemAdded(1)]);
    let keys: Vec<Value> = (0..list.row_count())
        .map(|row| list.cell(row, 0).unwrap())
        .collect();
    assert_eq!(
        keys,
        vec![
            Value::Int(1),
            Value::Int(3),
            Value::Int(5),
            Value::Int(10),
            Value::Int(15)
        ]
    );
}

#[test]
fn test_row_commit_applies_components_before_argument() {
    let (function, list) = sorted_series();
    for x in [1, 5, 10] {
        function.add_argument_value(0, Value::Int(x)).unwrap();
    }
    for (i, y) in [10, 50, 100].iter().enumerate() {
        function.set_component_value(0, &[i], Value::Int(*y)).unwrap();
    }

    let row = list.row(0).unwrap();
    row.set_value(0, Value::Int(7)).unwrap();
    row.set_value(1, Value::Int(70)).unwrap();

    let events: Rc<RefCell<Vec<(ChangeAction, VariableRole, usize)>>> =
        Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    function.subscribe_values(move |event| {
        sink.borrow_mut().push((event.action, event.role, event.index));
    });
    let seen = record_changes(&list);

    row.end_edit().unwrap();

    // The component value lands first; the key write comes last and carries
    // the sort-induced move.
    assert_eq!(
        *events.borrow(),
        vec![
            (ChangeAction::Replace, VariableRole::Component, 0),
            (ChangeAction::Replace, VariableRole::Argument, 1),
        ]
    );
    assert_eq!(
        *seen.borrow(),
        vec![
            ListChange::ItemMoved { from: 0, to: 1 },
            ListChange::ItemChanged(1)
        ]
    );

    assert_eq!(
        function.argument(0).unwrap().cells(),
        vec![Value::Int(5), Value::Int(7), Value::Int(10)]
    );
    assert_eq!(
        function.component(0).unwrap().cells(),
        vec![Value::Int(50), Value::Int(70), Value::Int(100)]
    );
    // The row object followed its values to the new position.
    assert_eq!(list.index_of_row(&row).unwrap(), 1);
}

#[test]
fn test_failed_commit_rolls_back_buffered_writes() {
    let (function, list) = sorted_series();
    for x in [1, 5] {
        function.add_argument_value(0, Value::Int(x)).unwrap();
    }
    for (i, y) in [10, 50].iter().enumerate() {
        function.set_component_value(0, &[i], Value::Int(*y)).unwrap();
    }

    let row = list.row(0).unwrap();
    row.set_value(1, Value::Int(99)).unwrap();
    // Duplicate key: rejected by the unique-values policy at commit time.
    row.set_value(0, Value::Int(5)).unwrap();

    let seen = record_changes(&list);
    assert!(row.end_edit().is_err());

    // The component write had already been applied inside the transaction;
    // the rollback must undo it too.
    assert_eq!(
        function.component(0).unwrap().cells(),
        vec![Value::Int(10), Value::Int(50)]
    );
    assert_eq!(
        function.argument(0).unwrap().cells(),
        vec![Value::Int(1), Value::Int(5)]
    );
    assert!(seen.borrow().is_empty());
    assert!(!row.is_editing());
}

#[test]
fn test_failed_new_row_commit_removes_transient_row() {
    let (function, list) = sorted_series();
    for x in [1, 5] {
        function.add_argument_value(0, Value::Int(x)).unwrap();
    }

    let row = list.add_new().unwrap();
    assert_eq!(list.row_count(), 3);

    row.set_value(0, Value::Int(5)).unwrap();
    let seen = record_changes(&list);
    assert!(row.end_edit().is_err());

    // The synthesized transient key is gone again.
    assert_eq!(list.row_count(), 2);
    assert_eq!(function.row_count(), 2);
    assert_eq!(
        function.argument(0).unwrap().cells(),
        vec![Value::Int(1), Value::Int(5)]
    );
    assert!(seen
        .borrow()
        .iter()
        .any(|change| matches!(change, ListChange::ItemDeleted(_))));
}

#[test]
fn test_committed_new_row_stops_being_pending() -> anyhow::Result<()> {
    let (_, list) = sorted_series();
    let row = list.add_new()?;
    row.set_value(0, Value::Int(42))?;
    row.set_value(1, Value::Int(420))?;
    row.end_edit()?;
    assert!(!row.is_add_pending());
    assert_eq!(list.cell(0, 0)?, Value::Int(42));
    assert_eq!(list.cell(0, 1)?, Value::Int(420));
    Ok(())
}

#[test]
fn test_removing_an_axis_value_drops_a_block_of_rows() {
    init_logging();
    let function = Function::new("f(x,t)");
    function
        .add_argument(Rc::new(Variable::<i32>::new("x")))
        .unwrap();
    function
        .add_argument(Rc::new(Variable::<i32>::new("t")))
        .unwrap();
    function
        .add_component(Rc::new(Variable::<f64>::new("f")))
        .unwrap();
    for x in [1, 2] {
        function.add_argument_value(0, Value::Int(x)).unwrap();
    }
    for t in [10, 20, 30] {
        function.add_argument_value(1, Value::Int(t)).unwrap();
    }
    let list = FunctionBindingList::new(Rc::clone(&function));
    assert_eq!(list.row_count(), 6);

    let seen = record_changes(&list);
    function.remove_argument_value(0, 0).unwrap();

    // One axis value owns a whole block of rows; they go in descending
    // order so every reported position is valid when it arrives.
    assert_eq!(list.row_count(), 3);
    assert_eq!(
        *seen.borrow(),
        vec![
            ListChange::ItemDeleted(2),
            ListChange::ItemDeleted(1),
            ListChange::ItemDeleted(0)
        ]
    );
    let keys: Vec<Value> = (0..3).map(|row| list.cell(row, 0).unwrap()).collect();
    assert_eq!(keys, vec![Value::Int(2), Value::Int(2), Value::Int(2)]);
}

#[test]
fn test_datetime_axis_synthesizes_stepped_keys() {
    init_logging();
    let function = Function::new("level(t)");
    let t = Rc::new(Variable::<chrono::NaiveDateTime>::new("t"));
    t.set_auto_sorted(true).unwrap();
    function.add_argument(t).unwrap();
    function
        .add_component(Rc::new(Variable::<f64>::new("level")))
        .unwrap();
    let list = FunctionBindingList::new(Rc::clone(&function));

    let start = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    function
        .add_argument_value(0, Value::DateTime(start))
        .unwrap();

    let row = list.add_new().unwrap();
    // A fresh key is synthesized one default step past the last one.
    assert_eq!(
        row.value(0).unwrap(),
        Value::DateTime(start + Duration::days(1))
    );
    row.set_value(1, Value::Double(3.5)).unwrap();
    row.end_edit().unwrap();
    assert_eq!(list.row_count(), 2);
    assert_eq!(list.cell(1, 1).unwrap(), Value::Double(3.5));
}

#[test]
fn test_delete_row_takes_the_component_slice_along() -> anyhow::Result<()> {
    let (function, list) = sorted_series();
    for x in [1, 5, 10] {
        function.add_argument_value(0, Value::Int(x))?;
    }
    for (i, y) in [10, 50, 100].iter().enumerate() {
        function.set_component_value(0, &[i], Value::Int(*y))?;
    }

    list.delete_row(1)?;
    assert_eq!(
        function.argument(0)?.cells(),
        vec![Value::Int(1), Value::Int(10)]
    );
    assert_eq!(
        function.component(0)?.cells(),
        vec![Value::Int(10), Value::Int(100)]
    );
    Ok(())
}

#[test]
fn test_out_of_range_rows_and_columns_are_errors() {
    let (function, list) = sorted_series();
    function.add_argument_value(0, Value::Int(1)).unwrap();

    assert!(matches!(
        list.row(5),
        Err(BindingError::RowOutOfRange { index: 5, count: 1 })
    ));
    let row = list.row(0).unwrap();
    assert!(matches!(
        row.set_value(7, Value::Int(0)),
        Err(BindingError::ColumnOutOfRange { index: 7, count: 2 })
    ));
}
