//! バックエンドの乱数はプロセス全体で共有されるため、このテストだけを独立したバイナリにしています。

mod common;

use pino::run;

#[test]
fn same_seed_gives_identical_loss_history() {
    let histories: Vec<_> = (0..2)
        .map(|_| {
            let dir = tempfile::tempdir().unwrap();
            let mut config = common::toy_config(dir.path());
            config.seed = Some(1234);
            config.train.num_iter = 4;
            run::run_train(&mut config, None, false, &dir.path().join("exp")).unwrap()
        })
        .collect();

    assert_eq!(histories[0], histories[1]);
}
