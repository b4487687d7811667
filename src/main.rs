fn main() {
    powder_grid::start();
}
