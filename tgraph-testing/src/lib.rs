//! Internal testing utilities for the tgraph crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Utility for creating parametrized (aka. table-driven) tests.
///
/// Create a `Case` struct holding the data for one test case, build a
/// collection of cases and call `test_each` with the test body. Every case is
/// run even if an earlier one panics. If any case fails, `test_each` panics
/// with the number of failures and the index and debug representation of each
/// failing case.
///
/// ```
/// use tgraph_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     lens: Vec<usize>,
///     elements: usize,
/// }
///
/// let cases = [
///     Case { lens: vec![2, 3], elements: 6 },
///     Case { lens: vec![], elements: 1 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.lens.iter().product::<usize>(), case.elements);
/// });
/// ```
///
/// Cases and the captured environment of the test function must be unwind
/// safe. Wrap fields which are not with
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe), or construct them
/// inside the test function instead.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes cases by
    /// value. The debug representation of each case is captured before the
    /// test function runs.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

fn report_failures(failures: &[(usize, String)]) {
    if failures.is_empty() {
        return;
    }
    let details: Vec<String> = failures
        .iter()
        .map(|(index, case)| format!("#{}: {}", index, case))
        .collect();
    panic!(
        "{} test cases failed: [{}]",
        failures.len(),
        details.join(", ")
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let mut failures = Vec::new();
        for (index, case) in self.into_iter().enumerate() {
            if std::panic::catch_unwind(|| test(&case)).is_err() {
                failures.push((index, format!("{:?}", case)));
            }
        }
        report_failures(&failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        for (index, case) in self.into_iter().enumerate() {
            let test = &test;
            let case_str = format!("{:?}", case);
            if std::panic::catch_unwind(move || test(case)).is_err() {
                failures.push((index, case_str));
            }
        }
        report_failures(&failures);
    }
}
