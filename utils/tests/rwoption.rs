use utils::rwoption::RwOption;

#[test]
fn test_insert_and_take() {
    let opt = RwOption::new();
    assert!(!opt.is_some());
    assert!(opt.with_read(|v: &i32| *v).is_none());

    {
        let mut g = opt.get_mut_or_insert_with(|| 3);
        *g += 2;
    }
    assert!(opt.is_some());
    assert_eq!(opt.with_read(|v| *v), Some(5));

    assert_eq!(opt.take(), Some(5));
    assert!(!opt.is_some());
    assert_eq!(opt.take(), None);
}

#[test]
fn test_existing_value_is_reused() {
    let opt = RwOption::new();
    opt.get_mut_or_insert_with(|| 7);

    // already initialized, the closure must not run
    {
        let mut g = opt.get_mut_or_insert_with(|| unreachable!());
        assert_eq!(*g, 7);
        *g = 8;
    }
    assert_eq!(opt.with_read_or_insert_with(|| unreachable!(), |v| *v), 8);
}

#[test]
fn test_with_read_or_insert_with() {
    let opt = RwOption::new();

    let res = opt.with_read_or_insert_with(|| 21, |v| *v + 1);
    assert_eq!(res, 22);
    assert_eq!(opt.with_read(|v| *v), Some(21));

    // recreated after being emptied
    opt.take();
    let res = opt.with_read_or_insert_with(|| 40, |v| *v + 2);
    assert_eq!(res, 42);
}
