use dmft_sweep::app::run;
fn main() {
    run().unwrap();
}
